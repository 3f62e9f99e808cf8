use anyhow::{anyhow, Result};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::{IdpConfig, ServiceConfig};

/// Bearer Token 中的声明
///
/// 开发模式 token 由 generate_test_token 签发；生产模式由 IdP 签发，
/// 未知字段一律忽略
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// 用户 ID
    #[serde(default)]
    pub uid: Option<String>,
    /// 角色声明 (RBAC 用)
    #[serde(default)]
    pub role: Option<String>,
    /// 签发时间 (Unix 秒)
    #[serde(default)]
    pub iat: u64,
    /// 过期时间 (Unix 秒)
    pub exp: u64,
}

/// 认证服务：服务间 API Key + 用户 Bearer Token 两种方案
///
/// Token 验签分两条路径：
/// - 配置了 IdP 时，用 IdP 发布的 JWKS 公钥做 RS256 验签 (生产)
/// - 否则用共享密钥做本地 HS256 验签 (开发/测试)
pub struct AuthService {
    service_api_key: String,
    chunker_secret: String,
    idp: Option<IdpVerifier>,
}

impl AuthService {
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            service_api_key: config.service_api_key.clone(),
            chunker_secret: config.chunker_secret.clone(),
            idp: config.idp.clone().map(IdpVerifier::new),
        }
    }

    /// 校验服务间调用的 API Key
    pub fn verify_api_key(&self, key: &str) -> bool {
        key == self.service_api_key
    }

    /// 校验用户 Bearer Token 并返回声明
    pub async fn verify_bearer_token(&self, token: &str) -> Result<Claims> {
        match &self.idp {
            Some(idp) => idp.verify(token).await,
            None => self.verify_local_token(token),
        }
    }

    /// 本地 HS256 验签 (开发模式)
    fn verify_local_token(&self, token: &str) -> Result<Claims> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.chunker_secret.as_bytes()),
            &Validation::new(Algorithm::HS256),
        )?;

        Ok(data.claims)
    }
}

/// 外部身份提供方的 RS256 验签器
///
/// JWKS 公钥集拉取一次后缓存；token 的 kid 未命中缓存时重新拉取一次
/// (应对密钥轮换)
pub struct IdpVerifier {
    client: reqwest::Client,
    config: IdpConfig,
    cached_keys: RwLock<Option<JwkSet>>,
}

impl IdpVerifier {
    pub fn new(config: IdpConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            cached_keys: RwLock::new(None),
        }
    }

    /// 验签并校验 issuer / audience / 过期时间
    pub async fn verify(&self, token: &str) -> Result<Claims> {
        let header = decode_header(token)?;
        let kid = header
            .kid
            .ok_or_else(|| anyhow!("Token header missing key id"))?;

        let key = match self.find_key(&kid).await? {
            Some(key) => key,
            None => {
                self.refresh_keys().await?;
                self.find_key(&kid)
                    .await?
                    .ok_or_else(|| anyhow!("Unknown signing key: {}", kid))?
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.config.issuer]);
        validation.set_audience(&[&self.config.audience]);

        let data = decode::<Claims>(token, &key, &validation)?;

        Ok(data.claims)
    }

    /// 在缓存的 JWKS 里按 kid 找公钥
    async fn find_key(&self, kid: &str) -> Result<Option<DecodingKey>> {
        let guard = self.cached_keys.read().await;

        if let Some(jwks) = guard.as_ref() {
            if let Some(jwk) = jwks.find(kid) {
                return Ok(Some(DecodingKey::from_jwk(jwk)?));
            }
        }

        Ok(None)
    }

    /// 重新拉取 JWKS 公钥集
    async fn refresh_keys(&self) -> Result<()> {
        tracing::info!("Fetching JWKS from {}", self.config.jwks_url);

        let jwks: JwkSet = self
            .client
            .get(&self.config.jwks_url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        *self.cached_keys.write().await = Some(jwks);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn now_secs() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs()
    }

    fn sign_token(secret: &str, role: Option<&str>, exp: u64) -> String {
        let claims = Claims {
            uid: Some("test".to_string()),
            role: role.map(|r| r.to_string()),
            iat: now_secs(),
            exp,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_api_key() {
        let auth = AuthService::new(&ServiceConfig::dev_default());

        assert!(auth.verify_api_key("devkey"));
        assert!(!auth.verify_api_key("wrong-key"), "错误的 key 应该被拒绝");
        assert!(!auth.verify_api_key(""));
    }

    #[tokio::test]
    async fn test_local_token_roundtrip() {
        let auth = AuthService::new(&ServiceConfig::dev_default());
        let token = sign_token("devsecret", Some("teacher"), now_secs() + 3600);

        let claims = auth.verify_bearer_token(&token).await.unwrap();

        assert_eq!(claims.uid.as_deref(), Some("test"));
        assert_eq!(claims.role.as_deref(), Some("teacher"));
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let auth = AuthService::new(&ServiceConfig::dev_default());
        let token = sign_token("devsecret", Some("teacher"), now_secs() - 100);

        assert!(
            auth.verify_bearer_token(&token).await.is_err(),
            "过期 token 应该验签失败"
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_rejected() {
        let auth = AuthService::new(&ServiceConfig::dev_default());
        let token = sign_token("other-secret", Some("teacher"), now_secs() + 3600);

        assert!(auth.verify_bearer_token(&token).await.is_err());
    }

    #[tokio::test]
    async fn test_token_without_role() {
        // role 缺失时验签本身成功，角色检查留给上层
        let auth = AuthService::new(&ServiceConfig::dev_default());
        let token = sign_token("devsecret", None, now_secs() + 3600);

        let claims = auth.verify_bearer_token(&token).await.unwrap();

        assert!(claims.role.is_none());
    }
}
