//! 配置模块：统一管理服务的默认值和环境变量解析
//!
//! 配置一律显式传入 (不在调用点读环境变量)，方便测试时直接构造

use std::env;

/// 默认的单切片大小上限 (字节)
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 1000;

/// 默认监听端口
pub const DEFAULT_PORT: u16 = 8000;

/// 开发模式下的本地 HS256 签名密钥
pub const DEV_CHUNKER_SECRET: &str = "devsecret";

/// 开发模式下的服务间 API Key
pub const DEV_SERVICE_API_KEY: &str = "devkey";

/// 服务配置
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// 监听端口
    pub port: u16,
    /// 未显式指定时使用的切片大小上限
    pub default_max_chunk_size: usize,
    /// 服务间调用的共享 API Key
    pub service_api_key: String,
    /// 本地 HS256 验签密钥 (未配置 IdP 时使用)
    pub chunker_secret: String,
    /// 可选的外部身份提供方配置 (配置后 Bearer Token 走 IdP 验签)
    pub idp: Option<IdpConfig>,
}

/// 外部身份提供方 (IdP) 配置
#[derive(Debug, Clone)]
pub struct IdpConfig {
    /// JWKS 公钥集地址
    pub jwks_url: String,
    /// 期望的 issuer
    pub issuer: String,
    /// 期望的 audience
    pub audience: String,
}

impl ServiceConfig {
    /// 从环境变量构建配置，缺失或非法的值回退到默认值
    pub fn from_env() -> Self {
        let port: u16 = env::var("PORT")
            .unwrap_or_else(|_| DEFAULT_PORT.to_string())
            .parse()
            .unwrap_or(DEFAULT_PORT);

        let default_max_chunk_size: usize = env::var("MAX_CHUNK_SIZE")
            .unwrap_or_else(|_| DEFAULT_MAX_CHUNK_SIZE.to_string())
            .parse()
            .unwrap_or(DEFAULT_MAX_CHUNK_SIZE);

        let service_api_key =
            env::var("SERVICE_API_KEY").unwrap_or_else(|_| DEV_SERVICE_API_KEY.to_string());

        let chunker_secret =
            env::var("CHUNKER_SECRET").unwrap_or_else(|_| DEV_CHUNKER_SECRET.to_string());

        // 三个变量都配置了才启用 IdP 验签
        let idp = match (
            env::var("IDP_JWKS_URL"),
            env::var("IDP_ISSUER"),
            env::var("IDP_AUDIENCE"),
        ) {
            (Ok(jwks_url), Ok(issuer), Ok(audience)) => Some(IdpConfig {
                jwks_url,
                issuer,
                audience,
            }),
            _ => None,
        };

        Self {
            port,
            default_max_chunk_size,
            service_api_key,
            chunker_secret,
            idp,
        }
    }

    /// 开发默认配置 (测试里直接构造用)
    pub fn dev_default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            service_api_key: DEV_SERVICE_API_KEY.to_string(),
            chunker_secret: DEV_CHUNKER_SECRET.to_string(),
            idp: None,
        }
    }
}
