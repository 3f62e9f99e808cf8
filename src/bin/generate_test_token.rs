//! 生成本地 HS256 测试 Token (仅限开发环境)
//!
//! 用法:
//!   CHUNKER_SECRET=devsecret cargo run --bin generate_test_token -- --uid alice --role teacher
//!
//! 签名密钥必须和服务端的 CHUNKER_SECRET 一致，生产环境的 token 由 IdP 签发

use anyhow::Result;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::time::{SystemTime, UNIX_EPOCH};

use chunker_service_rs::auth::Claims;
use chunker_service_rs::config::DEV_CHUNKER_SECRET;

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut uid = "test".to_string();
    let mut role = "teacher".to_string();

    let mut i = 1;
    while i + 1 < args.len() {
        match args[i].as_str() {
            "--uid" => uid = args[i + 1].clone(),
            "--role" => role = args[i + 1].clone(),
            other => anyhow::bail!("Unknown argument: {} (expected --uid / --role)", other),
        }
        i += 2;
    }

    let secret =
        std::env::var("CHUNKER_SECRET").unwrap_or_else(|_| DEV_CHUNKER_SECRET.to_string());

    let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
    let claims = Claims {
        uid: Some(uid),
        role: Some(role),
        iat: now,
        exp: now + 3600, // 1 小时有效期
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    println!("{}", token);

    Ok(())
}
