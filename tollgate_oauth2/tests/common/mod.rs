#![allow(dead_code)]

use color_eyre::Result;
use serde_json::{json, Value};
use tollgate::{
    clock::{Clock, System},
    jwa::{self, rsa::PrivateKey},
    jwk::KeyId,
    jwt::BasicHeaders,
    Jwk, Jwks, Jwt,
};
use tollgate_oauth2::AuthConfig;
use wiremock::{
    matchers::{method, path},
    Mock, MockServer, ResponseTemplate,
};

pub const DOMAIN: &str = "tenant.example.com";
pub const ISSUER: &str = "https://tenant.example.com/";
pub const AUDIENCE: &str = "image";
pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// An RSA signing key as the identity provider would hold it
pub struct SigningKey {
    pub kid: KeyId,
    pub private: PrivateKey,
}

impl SigningKey {
    pub fn generate(kid: &str) -> Result<Self> {
        Ok(Self {
            kid: KeyId::from(kid),
            private: PrivateKey::generate()?,
        })
    }

    /// The public half, as published in the key set
    pub fn jwk(&self) -> Jwk {
        Jwk::from(self.private.public_key().clone())
            .with_key_id(self.kid.clone())
            .with_algorithm(jwa::Algorithm::RS256)
    }

    pub fn sign(&self, payload: &Value) -> Result<Jwt> {
        let headers = BasicHeaders::with_key_id(jwa::Algorithm::RS256, self.kid.clone());
        Ok(Jwt::sign(&headers, payload, &self.private)?)
    }
}

pub fn jwks_body(keys: &[&SigningKey]) -> Result<Value> {
    let jwks: Jwks = keys.iter().map(|k| k.jwk()).collect();
    Ok(serde_json::to_value(jwks)?)
}

/// A payload shaped like an access token issued for the image API
pub fn payload(permissions: &[&str]) -> Value {
    let now = System.now().0;
    json!({
        "iss": ISSUER,
        "sub": "auth0|user-1",
        "aud": [AUDIENCE, "https://tenant.example.com/userinfo"],
        "iat": now,
        "exp": now + 300,
        "azp": "client-1",
        "scope": "openid profile",
        "permissions": permissions,
    })
}

pub fn expired_payload(permissions: &[&str]) -> Value {
    let now = System.now().0;
    let mut payload = payload(permissions);
    payload["iat"] = json!(now - 7200);
    payload["exp"] = json!(now - 3600);
    payload
}

pub fn without(mut payload: Value, claim: &str) -> Value {
    if let Some(object) = payload.as_object_mut() {
        object.remove(claim);
    }
    payload
}

/// Serves `keys` as the tenant's key set
pub async fn serve_keys(server: &MockServer, keys: &[&SigningKey]) -> Result<()> {
    Mock::given(method("GET"))
        .and(path(JWKS_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_body(keys)?))
        .mount(server)
        .await;
    Ok(())
}

pub fn config(server: &MockServer) -> AuthConfig {
    AuthConfig::new(DOMAIN, AUDIENCE).with_jwks_url(format!("{}{}", server.uri(), JWKS_PATH))
}
