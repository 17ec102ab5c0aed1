use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use base64::{engine::general_purpose, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{AppError, Result};
use crate::store::Store;
use crate::types::{Role, User};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub full_name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub email: String,
    pub refresh_token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub code: String,
    pub new_password: String,
}

#[derive(Debug, Serialize, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Tokens {
    pub id_token: String,
    pub access_token: String,
    /// Absent on refresh; the caller keeps using the one it has.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub refresh_token: String,
    pub expires_in: i32,
}

/// The managed identity provider.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Registers the account and returns the provider's subject id for it.
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<String>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<Tokens>;
    async fn refresh(&self, email: &str, refresh_token: &str) -> Result<Tokens>;
    async fn forgot_password(&self, email: &str) -> Result<()>;
    async fn confirm_forgot_password(&self, email: &str, code: &str, new_password: &str) -> Result<()>;
    /// Removes the account. Used to undo a sign-up whose user record could not be written.
    async fn delete_user(&self, email: &str) -> Result<()>;
}

type HmacSha256 = Hmac<Sha256>;

/// Compute the SECRET_HASH for Cognito authentication
fn compute_secret_hash(username: &str, client_id: &str, client_secret: &str) -> Result<String> {
    let message = format!("{}{}", username, client_id);
    let mut mac = HmacSha256::new_from_slice(client_secret.as_bytes())
        .map_err(|e| AppError::Config(format!("invalid Cognito client secret: {}", e)))?;
    mac.update(message.as_bytes());
    let result = mac.finalize();
    Ok(general_purpose::STANDARD.encode(result.into_bytes()))
}

fn error_code<E: ProvideErrorMetadata, R>(err: &SdkError<E, R>) -> Option<String> {
    err.as_service_error()
        .and_then(|e| e.code())
        .map(|c| c.to_string())
}

pub struct CognitoIdentity {
    client: CognitoClient,
    user_pool_id: String,
    client_id: String,
    client_secret: String,
}

impl CognitoIdentity {
    pub fn new(
        client: CognitoClient,
        user_pool_id: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            client,
            user_pool_id: user_pool_id.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    fn secret_hash(&self, username: &str) -> Result<String> {
        compute_secret_hash(username, &self.client_id, &self.client_secret)
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentity {
    async fn sign_up(&self, email: &str, password: &str, full_name: &str) -> Result<String> {
        let result = self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email)
            .password(password)
            .secret_hash(self.secret_hash(email)?)
            .user_attributes(AttributeType::builder().name("email").value(email).build()?)
            .user_attributes(AttributeType::builder().name("name").value(full_name).build()?)
            .send()
            .await;

        match result {
            Ok(output) => Ok(output.user_sub().to_string()),
            Err(e) => {
                let code = error_code(&e);
                tracing::error!(code = ?code, "Cognito signup error: {:?}", e);
                Err(match code.as_deref() {
                    Some("InvalidPasswordException") => AppError::validation(
                        "Password must contain at least 8 characters with uppercase, lowercase, number, and special character",
                    ),
                    Some("UsernameExistsException") => {
                        AppError::validation("An account with this email already exists")
                    }
                    Some("InvalidParameterException") => AppError::validation("Invalid email or password format"),
                    _ => e.into(),
                })
            }
        }
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Tokens> {
        let result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email)
            .auth_parameters("PASSWORD", password)
            .auth_parameters("SECRET_HASH", self.secret_hash(email)?)
            .send()
            .await;

        match result {
            Ok(response) => match response.authentication_result() {
                Some(auth) => Ok(Tokens {
                    id_token: auth.id_token().unwrap_or_default().to_string(),
                    access_token: auth.access_token().unwrap_or_default().to_string(),
                    refresh_token: auth.refresh_token().unwrap_or_default().to_string(),
                    expires_in: auth.expires_in(),
                }),
                None => {
                    // A challenge (e.g. NEW_PASSWORD_REQUIRED) is not something this API completes.
                    tracing::warn!(challenge = ?response.challenge_name(), "No authentication result returned");
                    Err(AppError::Authentication)
                }
            },
            Err(e) => {
                let code = error_code(&e);
                tracing::warn!(code = ?code, "Cognito authentication error");
                Err(match code.as_deref() {
                    Some("NotAuthorizedException")
                    | Some("UserNotFoundException")
                    | Some("UserNotConfirmedException")
                    | Some("PasswordResetRequiredException") => AppError::Authentication,
                    _ => e.into(),
                })
            }
        }
    }

    async fn refresh(&self, email: &str, refresh_token: &str) -> Result<Tokens> {
        let result = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::RefreshTokenAuth)
            .client_id(&self.client_id)
            .auth_parameters("REFRESH_TOKEN", refresh_token)
            .auth_parameters("SECRET_HASH", self.secret_hash(email)?)
            .send()
            .await;

        match result {
            Ok(response) => {
                let auth = response.authentication_result().ok_or(AppError::Authentication)?;
                Ok(Tokens {
                    id_token: auth.id_token().unwrap_or_default().to_string(),
                    access_token: auth.access_token().unwrap_or_default().to_string(),
                    refresh_token: auth.refresh_token().unwrap_or_default().to_string(),
                    expires_in: auth.expires_in(),
                })
            }
            Err(e) => match error_code(&e).as_deref() {
                Some("NotAuthorizedException") => Err(AppError::Authentication),
                _ => Err(e.into()),
            },
        }
    }

    async fn forgot_password(&self, email: &str) -> Result<()> {
        let result = self
            .client
            .forgot_password()
            .client_id(&self.client_id)
            .username(email)
            .secret_hash(self.secret_hash(email)?)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            // Unknown accounts look the same as known ones from the outside.
            Err(e) if error_code(&e).as_deref() == Some("UserNotFoundException") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn confirm_forgot_password(&self, email: &str, code: &str, new_password: &str) -> Result<()> {
        let result = self
            .client
            .confirm_forgot_password()
            .client_id(&self.client_id)
            .username(email)
            .confirmation_code(code)
            .password(new_password)
            .secret_hash(self.secret_hash(email)?)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(match error_code(&e).as_deref() {
                Some("CodeMismatchException") | Some("ExpiredCodeException") => {
                    AppError::validation("The reset code is invalid or has expired")
                }
                Some("InvalidPasswordException") => AppError::validation(
                    "Password must contain at least 8 characters with uppercase, lowercase, number, and special character",
                ),
                Some("UserNotFoundException") | Some("NotAuthorizedException") => AppError::Authentication,
                _ => e.into(),
            }),
        }
    }

    async fn delete_user(&self, email: &str) -> Result<()> {
        let result = self
            .client
            .admin_delete_user()
            .user_pool_id(&self.user_pool_id)
            .username(email)
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(e) if error_code(&e).as_deref() == Some("UserNotFoundException") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.') && !domain.ends_with('.'))
        .unwrap_or(false);
    if valid {
        Ok(email)
    } else {
        Err(AppError::validation("a valid email address is required"))
    }
}

/// Registers the account with the identity provider and creates its student record.
/// If the record cannot be written the account is deleted again, so a retry starts clean.
pub async fn signup(store: &dyn Store, identity: &dyn IdentityProvider, req: SignupRequest) -> Result<User> {
    let full_name = req.full_name.trim().to_string();
    if full_name.is_empty() {
        return Err(AppError::validation("full name is required"));
    }
    let email = normalize_email(&req.email)?;
    if req.password.len() < 8 {
        return Err(AppError::validation("password must be at least 8 characters"));
    }

    let user_id = identity.sign_up(&email, &req.password, &full_name).await?;
    let user = User {
        user_id,
        full_name,
        email,
        role: Role::Student,
        enrolled_courses: Vec::new(),
        profile_completed: false,
        avatar_url: None,
        created_at: chrono::Utc::now().to_rfc3339(),
    };
    if let Err(err) = store.create_user(&user).await {
        tracing::error!(user_id = %user.user_id, "Failed to create user record, removing account: {}", err);
        if let Err(cleanup) = identity.delete_user(&user.email).await {
            tracing::error!(user_id = %user.user_id, "Account removal failed: {}", cleanup);
        }
        return Err(err);
    }
    tracing::info!(user_id = %user.user_id, "Signup successful");
    Ok(user)
}

pub async fn login(identity: &dyn IdentityProvider, req: LoginRequest) -> Result<Tokens> {
    let email = req.email.trim().to_lowercase();
    if email.is_empty() || req.password.is_empty() {
        return Err(AppError::validation("email and password are required"));
    }
    let tokens = identity.sign_in(&email, &req.password).await?;
    tracing::info!("Authentication successful");
    Ok(tokens)
}

pub async fn refresh(identity: &dyn IdentityProvider, req: RefreshRequest) -> Result<Tokens> {
    if req.refresh_token.is_empty() {
        return Err(AppError::validation("refreshToken is required"));
    }
    let email = normalize_email(&req.email)?;
    identity.refresh(&email, &req.refresh_token).await
}

pub async fn forgot_password(identity: &dyn IdentityProvider, req: ForgotPasswordRequest) -> Result<()> {
    let email = normalize_email(&req.email)?;
    identity.forgot_password(&email).await
}

pub async fn reset_password(identity: &dyn IdentityProvider, req: ResetPasswordRequest) -> Result<()> {
    let email = normalize_email(&req.email)?;
    if req.code.trim().is_empty() {
        return Err(AppError::validation("reset code is required"));
    }
    if req.new_password.len() < 8 {
        return Err(AppError::validation("password must be at least 8 characters"));
    }
    identity
        .confirm_forgot_password(&email, req.code.trim(), &req.new_password)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryStore, UserStore};
    use mockall::predicate::eq;

    #[test]
    fn secret_hash_is_per_user() {
        let hash = compute_secret_hash("user@example.com", "client", "secret").unwrap();
        assert_eq!(hash.len(), 44);
        assert_eq!(hash, compute_secret_hash("user@example.com", "client", "secret").unwrap());
        assert_ne!(hash, compute_secret_hash("other@example.com", "client", "secret").unwrap());
    }

    #[tokio::test]
    async fn signup_creates_a_student_record() {
        let store = MemoryStore::new();
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_up()
            .with(eq("mona@uni.example"), eq("Secret123!"), eq("Mona Ali"))
            .returning(|_, _, _| Ok("sub-123".to_string()));

        let user = signup(
            &store,
            &identity,
            SignupRequest {
                full_name: " Mona Ali ".to_string(),
                email: "Mona@Uni.example".to_string(),
                password: "Secret123!".to_string(),
            },
        )
        .await
        .unwrap();

        assert_eq!(user.user_id, "sub-123");
        let stored = store.get_user("sub-123").await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Student);
        assert!(!stored.profile_completed);
        assert!(stored.enrolled_courses.is_empty());
    }

    #[tokio::test]
    async fn signup_validates_before_calling_the_provider() {
        let store = MemoryStore::new();
        let identity = MockIdentityProvider::new();
        for (name, email, password) in [
            ("", "a@b.co", "Secret123!"),
            ("A", "not-an-email", "Secret123!"),
            ("A", "a@b.co", "short"),
        ] {
            let err = signup(
                &store,
                &identity,
                SignupRequest {
                    full_name: name.to_string(),
                    email: email.to_string(),
                    password: password.to_string(),
                },
            )
            .await
            .unwrap_err();
            assert!(matches!(err, AppError::Validation(_)));
        }
        assert!(store.list_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn bad_credentials_stay_generic() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_in()
            .returning(|_, _| Err(AppError::Authentication));

        let err = login(
            &identity,
            LoginRequest {
                email: "a@b.co".to_string(),
                password: "wrong".to_string(),
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.status_code(), 401);
        assert_eq!(err.to_error_response().message, "authentication failed");
    }

    #[tokio::test]
    async fn reset_requires_code_and_strong_password() {
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_confirm_forgot_password()
            .with(eq("a@b.co"), eq("123456"), eq("NewSecret1!"))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let req = |code: &str, pw: &str| ResetPasswordRequest {
            email: "a@b.co".to_string(),
            code: code.to_string(),
            new_password: pw.to_string(),
        };
        assert!(reset_password(&identity, req(" ", "NewSecret1!")).await.is_err());
        assert!(reset_password(&identity, req("123456", "short")).await.is_err());
        reset_password(&identity, req(" 123456 ", "NewSecret1!")).await.unwrap();
    }

    #[tokio::test]
    async fn failed_record_write_undoes_the_signup() {
        let store = MemoryStore::new();
        let mut identity = MockIdentityProvider::new();
        identity
            .expect_sign_up()
            .times(2)
            .returning(|_, _, _| Ok("sub-1".to_string()));
        identity
            .expect_delete_user()
            .with(eq("mona@uni.example"))
            .times(1)
            .returning(|_| Ok(()));

        let req = || SignupRequest {
            full_name: "Mona Ali".to_string(),
            email: "mona@uni.example".to_string(),
            password: "Secret123!".to_string(),
        };

        store.set_unavailable(true);
        let err = signup(&store, &identity, req()).await.unwrap_err();
        assert!(matches!(err, AppError::ExternalService(_)));

        store.set_unavailable(false);
        let user = signup(&store, &identity, req()).await.unwrap();
        assert_eq!(user.user_id, "sub-1");
        assert!(store.get_user("sub-1").await.unwrap().is_some());
    }
}
