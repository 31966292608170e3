use actix_web::{FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::{
    apperror::{ApplicationError, ErrorType},
    config::AuthConfig,
    models::{Role, UserDetailType},
};

const TOKEN_TYPE_ACCESS: &str = "access";
const TOKEN_TYPE_REFRESH: &str = "refresh";

/**
 * JWT claims carried by both access and refresh tokens.
 */
#[derive(Debug, Serialize, Deserialize)]
pub struct Claim {
    /**
     * The user id.
     */
    pub sub: i64,
    /**
     * The login email.
     */
    pub email: String,
    /**
     * The role of the user.
     */
    pub role: String,
    /**
     * Token kind, access or refresh.
     */
    pub token_type: String,
    /**
     * Unique token id, used by the refresh token denylist.
     */
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claim {
    /**
     * Parses the role claim.
     */
    pub fn role(&self) -> Result<Role, ApplicationError> {
        Role::parse(&self.role).map_err(|_| ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()))
    }

    /**
     * Parses the jti claim.
     */
    pub fn jti(&self) -> Result<Uuid, ApplicationError> {
        Uuid::parse_str(&self.jti).map_err(|_| ApplicationError::new(ErrorType::Validation, "Invalid or expired token".to_string()))
    }
}

/**
 * An access/refresh token pair issued at login.
 */
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/**
 * JWT Security Service issuing and validating HS256 token pairs.
 */
#[derive(Clone)]
pub struct JwtSecurityService {
    /**
     * The encoding key used to sign tokens.
     */
    encoding_key: EncodingKey,
    /**
     * The decoding key used to verify tokens.
     */
    decoding_key: DecodingKey,
    /**
     * The validation rules for tokens.
     */
    validation: Validation,
    access_lifetime_secs: i64,
    refresh_lifetime_secs: i64,
}

impl JwtSecurityService {
    /**
     * Creates a new instance of JwtSecurityService.
     *
     * # Arguments
     * `auth_config`: The shared secret and token lifetimes.
     *
     * # Returns
     * A Result containing the JwtSecurityService or an ApplicationError if initialization fails.
     */
    pub fn new(auth_config: &AuthConfig) -> Result<Self, ApplicationError> {
        if auth_config.secret.is_empty() {
            return Err(ApplicationError::new(ErrorType::Initialization, "Auth secret must not be empty".to_string()));
        }
        let encoding_key = EncodingKey::from_secret(auth_config.secret.as_bytes());
        let decoding_key = DecodingKey::from_secret(auth_config.secret.as_bytes());
        let validation = Validation::new(Algorithm::HS256);
        Ok(JwtSecurityService {
            encoding_key,
            decoding_key,
            validation,
            access_lifetime_secs: auth_config.access_token_lifetime_secs,
            refresh_lifetime_secs: auth_config.refresh_token_lifetime_secs,
        })
    }

    /**
     * Issues an access/refresh token pair for a user.
     *
     * # Arguments
     * `user`: The authenticated user.
     *
     * # Returns
     * A Result containing the token pair or an ApplicationError.
     */
    pub fn issue_pair(&self, user: &UserDetailType) -> Result<TokenPair, ApplicationError> {
        let access = self.issue(user, TOKEN_TYPE_ACCESS, self.access_lifetime_secs)?;
        let refresh = self.issue(user, TOKEN_TYPE_REFRESH, self.refresh_lifetime_secs)?;
        Ok(TokenPair { access, refresh })
    }

    /**
     * Issues a fresh access token for the user a refresh token belongs to.
     */
    pub fn issue_access(&self, user: &UserDetailType) -> Result<String, ApplicationError> {
        self.issue(user, TOKEN_TYPE_ACCESS, self.access_lifetime_secs)
    }

    fn issue(&self, user: &UserDetailType, token_type: &str, lifetime_secs: i64) -> Result<String, ApplicationError> {
        let now = chrono::Utc::now().timestamp();
        let claim = Claim {
            sub: user.id,
            email: user.email.clone(),
            role: user.role.as_str().to_string(),
            token_type: token_type.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + lifetime_secs,
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claim, &self.encoding_key).map_err(|err| ApplicationError::new(ErrorType::Application, format!("Failed to issue token: {err}")))
    }

    /**
     * Validates the access token from the HTTP request and returns its
     * claims. Refresh tokens are rejected here.
     *
     * # Arguments
     * `http_request`: The HTTP request containing the token in the Authorization header.
     *
     * # Returns
     * A Result containing the claims or an ApplicationError if validation fails.
     */
    pub fn validate(&self, http_request: &HttpRequest) -> Result<Claim, ApplicationError> {
        let credentials = BearerAuth::from_request(http_request, &mut actix_web::dev::Payload::None).into_inner().ok();
        let Some(credentials) = credentials else {
            return Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()));
        };
        let token_data = match jsonwebtoken::decode::<Claim>(credentials.token(), &self.decoding_key, &self.validation) {
            Ok(token_data) => token_data,
            Err(err) => {
                tracing::debug!("JWT validation error: {err}");
                return Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()));
            }
        };
        if token_data.claims.token_type != TOKEN_TYPE_ACCESS {
            return Err(ApplicationError::new(ErrorType::JwtAuthorization, "Unauthorized".to_string()));
        }
        Ok(token_data.claims)
    }

    /**
     * Decodes a refresh token from a request body. Access tokens and
     * malformed or expired tokens are rejected with a validation error.
     */
    pub fn decode_refresh(&self, token: &str) -> Result<Claim, ApplicationError> {
        let token_data = jsonwebtoken::decode::<Claim>(token, &self.decoding_key, &self.validation).map_err(|err| {
            tracing::debug!("Refresh token validation error: {err}");
            ApplicationError::new(ErrorType::Validation, "Invalid or expired token".to_string())
        })?;
        if token_data.claims.token_type != TOKEN_TYPE_REFRESH {
            return Err(ApplicationError::new(ErrorType::Validation, "Invalid or expired token".to_string()));
        }
        Ok(token_data.claims)
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    fn service() -> JwtSecurityService {
        let auth_config = AuthConfig { secret: "test-secret".to_string(), access_token_lifetime_secs: 300, refresh_token_lifetime_secs: 86400 };
        JwtSecurityService::new(&auth_config).unwrap()
    }

    fn user() -> UserDetailType {
        UserDetailType::new(42, "user@test.com".to_string(), "user".to_string(), Role::Manager, None)
    }

    #[test]
    fn test_initialization_rejects_empty_secret() {
        let auth_config = AuthConfig { secret: String::new(), access_token_lifetime_secs: 300, refresh_token_lifetime_secs: 86400 };
        assert!(JwtSecurityService::new(&auth_config).is_err());
    }

    #[test]
    fn test_validate_accepts_issued_access_token() {
        let jwt_service = service();
        let pair = jwt_service.issue_pair(&user()).unwrap();
        let request = TestRequest::default().insert_header(("Authorization", format!("Bearer {}", pair.access))).to_http_request();
        let claim = jwt_service.validate(&request).unwrap();
        assert_eq!(claim.sub, 42);
        assert_eq!(claim.role().unwrap(), Role::Manager);
    }

    #[test]
    fn test_validate_rejects_refresh_token() {
        let jwt_service = service();
        let pair = jwt_service.issue_pair(&user()).unwrap();
        let request = TestRequest::default().insert_header(("Authorization", format!("Bearer {}", pair.refresh))).to_http_request();
        assert!(jwt_service.validate(&request).is_err());
    }

    #[test]
    fn test_validate_rejects_missing_header() {
        let jwt_service = service();
        let request = TestRequest::default().to_http_request();
        assert!(jwt_service.validate(&request).is_err());
    }

    #[test]
    fn test_validate_rejects_foreign_secret() {
        let jwt_service = service();
        let other = JwtSecurityService::new(&AuthConfig { secret: "other-secret".to_string(), access_token_lifetime_secs: 300, refresh_token_lifetime_secs: 86400 }).unwrap();
        let pair = other.issue_pair(&user()).unwrap();
        let request = TestRequest::default().insert_header(("Authorization", format!("Bearer {}", pair.access))).to_http_request();
        assert!(jwt_service.validate(&request).is_err());
    }

    #[test]
    fn test_decode_refresh_accepts_refresh_only() {
        let jwt_service = service();
        let pair = jwt_service.issue_pair(&user()).unwrap();
        let claim = jwt_service.decode_refresh(&pair.refresh).unwrap();
        assert_eq!(claim.sub, 42);
        assert!(claim.jti().is_ok());
        assert!(jwt_service.decode_refresh(&pair.access).is_err());
        assert!(jwt_service.decode_refresh("not-a-token").is_err());
    }
}
