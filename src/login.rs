use async_trait::async_trait;
use dialoguer::{Input, Password};
use thiserror::Error;

use crate::remote::RemoteError;

const MAX_CODE_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum LoginError {
    #[error("not authorized; run with --auth first")]
    NotAuthorized,
    #[error("sign up is not supported; register the account with an official client")]
    SignUpUnsupported,
    #[error("PHONE is not set")]
    MissingPhone,
    #[error("login code rejected {0} times")]
    InvalidCode(usize),
    #[error("two-factor password rejected")]
    InvalidPassword,
    #[error("prompt error: {0}")]
    Prompt(#[from] dialoguer::Error),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// Supplies credentials to the login flow.
pub trait Authenticator {
    fn phone(&self) -> Result<String, LoginError>;

    fn code(&self) -> Result<String, LoginError>;

    fn password(&self, hint: Option<&str>) -> Result<String, LoginError>;

    /// Registration of new accounts is never offered.
    fn sign_up(&self) -> Result<(), LoginError> {
        Err(LoginError::SignUpUnsupported)
    }
}

/// Phone from the environment; code and password from the terminal.
pub struct TerminalAuthenticator {
    phone: Option<String>,
}

impl TerminalAuthenticator {
    pub fn new(phone: Option<String>) -> Self {
        Self { phone }
    }
}

impl Authenticator for TerminalAuthenticator {
    fn phone(&self) -> Result<String, LoginError> {
        self.phone.clone().ok_or(LoginError::MissingPhone)
    }

    fn code(&self) -> Result<String, LoginError> {
        let code: String = Input::new().with_prompt("Enter code").interact_text()?;
        Ok(code.trim().to_string())
    }

    fn password(&self, hint: Option<&str>) -> Result<String, LoginError> {
        let prompt = match hint {
            Some(hint) if !hint.is_empty() => format!("Enter 2FA password (hint: {hint})"),
            _ => "Enter 2FA password".to_string(),
        };
        let password = Password::new().with_prompt(prompt).interact()?;
        Ok(password.trim().to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SignInOutcome {
    Authorized,
    PasswordRequired { hint: Option<String> },
    SignUpRequired,
    InvalidCode,
}

/// Remote side of the login flow.
#[async_trait]
pub trait AuthClient: Send {
    async fn is_authorized(&mut self) -> Result<bool, RemoteError>;

    async fn request_code(&mut self, phone: &str) -> Result<(), RemoteError>;

    async fn sign_in(&mut self, code: &str) -> Result<SignInOutcome, RemoteError>;

    /// Returns `false` when the password was wrong.
    async fn check_password(&mut self, password: &str) -> Result<bool, RemoteError>;
}

/// Ensures the client is authorized.
///
/// Without `need_auth` only the status is checked and the authenticator is
/// never consulted. With it, a full code (and 2FA) login runs unless the
/// stored session is already authorized.
pub async fn invoke_auth<C, A>(client: &mut C, authenticator: &A, need_auth: bool) -> Result<(), LoginError>
where
    C: AuthClient + ?Sized,
    A: Authenticator + ?Sized,
{
    let authorized = client.is_authorized().await?;
    if !need_auth {
        return if authorized {
            Ok(())
        } else {
            Err(LoginError::NotAuthorized)
        };
    }
    if authorized {
        tracing::info!("session already authorized");
        return Ok(());
    }

    let phone = authenticator.phone()?;
    client.request_code(&phone).await?;

    let mut attempts = 0;
    loop {
        let code = authenticator.code()?;
        attempts += 1;
        match client.sign_in(&code).await? {
            SignInOutcome::Authorized => return Ok(()),
            SignInOutcome::PasswordRequired { hint } => {
                let password = authenticator.password(hint.as_deref())?;
                return if client.check_password(&password).await? {
                    Ok(())
                } else {
                    Err(LoginError::InvalidPassword)
                };
            }
            SignInOutcome::SignUpRequired => {
                authenticator.sign_up()?;
                return Err(LoginError::SignUpUnsupported);
            }
            SignInOutcome::InvalidCode if attempts < MAX_CODE_ATTEMPTS => {
                eprintln!("Invalid code, try again.");
            }
            SignInOutcome::InvalidCode => return Err(LoginError::InvalidCode(attempts)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;

    #[derive(Default)]
    struct FakeClient {
        authorized: bool,
        sign_in_outcomes: VecDeque<SignInOutcome>,
        password: Option<String>,
        requested_phone: Option<String>,
        codes: Vec<String>,
        passwords: Vec<String>,
    }

    #[async_trait]
    impl AuthClient for FakeClient {
        async fn is_authorized(&mut self) -> Result<bool, RemoteError> {
            Ok(self.authorized)
        }

        async fn request_code(&mut self, phone: &str) -> Result<(), RemoteError> {
            self.requested_phone = Some(phone.to_string());
            Ok(())
        }

        async fn sign_in(&mut self, code: &str) -> Result<SignInOutcome, RemoteError> {
            self.codes.push(code.to_string());
            let outcome = self
                .sign_in_outcomes
                .pop_front()
                .unwrap_or(SignInOutcome::Authorized);
            if outcome == SignInOutcome::Authorized {
                self.authorized = true;
            }
            Ok(outcome)
        }

        async fn check_password(&mut self, password: &str) -> Result<bool, RemoteError> {
            self.passwords.push(password.to_string());
            let ok = self.password.as_deref() == Some(password);
            self.authorized = ok;
            Ok(ok)
        }
    }

    /// Authenticator that answers from fixed values and records every prompt.
    struct ScriptedAuthenticator {
        phone: Option<String>,
        codes: RefCell<VecDeque<String>>,
        password: String,
        prompts: Cell<usize>,
        hints: RefCell<Vec<Option<String>>>,
    }

    impl ScriptedAuthenticator {
        fn new(codes: &[&str], password: &str) -> Self {
            Self {
                phone: Some("+15550100".to_string()),
                codes: RefCell::new(codes.iter().map(|code| code.to_string()).collect()),
                password: password.to_string(),
                prompts: Cell::new(0),
                hints: RefCell::new(Vec::new()),
            }
        }
    }

    impl Authenticator for ScriptedAuthenticator {
        fn phone(&self) -> Result<String, LoginError> {
            self.prompts.set(self.prompts.get() + 1);
            self.phone.clone().ok_or(LoginError::MissingPhone)
        }

        fn code(&self) -> Result<String, LoginError> {
            self.prompts.set(self.prompts.get() + 1);
            Ok(self.codes.borrow_mut().pop_front().unwrap_or_default())
        }

        fn password(&self, hint: Option<&str>) -> Result<String, LoginError> {
            self.prompts.set(self.prompts.get() + 1);
            self.hints.borrow_mut().push(hint.map(str::to_string));
            Ok(self.password.clone())
        }
    }

    #[tokio::test]
    async fn status_check_fails_when_not_authorized() {
        let mut client = FakeClient::default();
        let authenticator = ScriptedAuthenticator::new(&["12345"], "");

        let result = invoke_auth(&mut client, &authenticator, false).await;

        assert!(matches!(result, Err(LoginError::NotAuthorized)));
        assert_eq!(authenticator.prompts.get(), 0);
        assert!(client.requested_phone.is_none());
    }

    #[tokio::test]
    async fn status_check_passes_for_authorized_session() {
        let mut client = FakeClient {
            authorized: true,
            ..FakeClient::default()
        };
        let authenticator = ScriptedAuthenticator::new(&[], "");

        invoke_auth(&mut client, &authenticator, false).await.expect("authorized");
        assert_eq!(authenticator.prompts.get(), 0);
    }

    #[tokio::test]
    async fn explicit_login_skips_prompts_when_already_authorized() {
        let mut client = FakeClient {
            authorized: true,
            ..FakeClient::default()
        };
        let authenticator = ScriptedAuthenticator::new(&["12345"], "");

        invoke_auth(&mut client, &authenticator, true).await.expect("login");
        assert_eq!(authenticator.prompts.get(), 0);
    }

    #[tokio::test]
    async fn code_login_uses_phone_verbatim() {
        let mut client = FakeClient::default();
        let authenticator = ScriptedAuthenticator::new(&["12345"], "");

        invoke_auth(&mut client, &authenticator, true).await.expect("login");

        assert_eq!(client.requested_phone.as_deref(), Some("+15550100"));
        assert_eq!(client.codes, vec!["12345".to_string()]);
        assert!(client.authorized);
    }

    #[tokio::test]
    async fn two_factor_password_is_requested_with_hint() {
        let mut client = FakeClient {
            sign_in_outcomes: VecDeque::from([SignInOutcome::PasswordRequired {
                hint: Some("pet name".to_string()),
            }]),
            password: Some("hunter2".to_string()),
            ..FakeClient::default()
        };
        let authenticator = ScriptedAuthenticator::new(&["12345"], "hunter2");

        invoke_auth(&mut client, &authenticator, true).await.expect("login");

        assert_eq!(client.passwords, vec!["hunter2".to_string()]);
        assert_eq!(*authenticator.hints.borrow(), vec![Some("pet name".to_string())]);
    }

    #[tokio::test]
    async fn wrong_password_aborts() {
        let mut client = FakeClient {
            sign_in_outcomes: VecDeque::from([SignInOutcome::PasswordRequired { hint: None }]),
            password: Some("right".to_string()),
            ..FakeClient::default()
        };
        let authenticator = ScriptedAuthenticator::new(&["12345"], "wrong");

        let result = invoke_auth(&mut client, &authenticator, true).await;
        assert!(matches!(result, Err(LoginError::InvalidPassword)));
    }

    #[tokio::test]
    async fn sign_up_is_rejected() {
        let mut client = FakeClient {
            sign_in_outcomes: VecDeque::from([SignInOutcome::SignUpRequired]),
            ..FakeClient::default()
        };
        let authenticator = ScriptedAuthenticator::new(&["12345"], "");

        let result = invoke_auth(&mut client, &authenticator, true).await;
        assert!(matches!(result, Err(LoginError::SignUpUnsupported)));
        assert!(!client.authorized);
    }

    #[tokio::test]
    async fn invalid_codes_are_reprompted_up_to_the_limit() {
        let mut client = FakeClient {
            sign_in_outcomes: VecDeque::from([SignInOutcome::InvalidCode, SignInOutcome::Authorized]),
            ..FakeClient::default()
        };
        let authenticator = ScriptedAuthenticator::new(&["00000", "12345"], "");
        invoke_auth(&mut client, &authenticator, true).await.expect("second code works");
        assert_eq!(client.codes.len(), 2);

        let mut client = FakeClient {
            sign_in_outcomes: VecDeque::from(vec![SignInOutcome::InvalidCode; MAX_CODE_ATTEMPTS]),
            ..FakeClient::default()
        };
        let authenticator = ScriptedAuthenticator::new(&["1", "2", "3", "4"], "");
        let result = invoke_auth(&mut client, &authenticator, true).await;
        assert!(matches!(result, Err(LoginError::InvalidCode(MAX_CODE_ATTEMPTS))));
        assert_eq!(client.codes.len(), MAX_CODE_ATTEMPTS);
    }

    #[tokio::test]
    async fn missing_phone_aborts_before_any_request() {
        let mut client = FakeClient::default();
        let mut authenticator = ScriptedAuthenticator::new(&["12345"], "");
        authenticator.phone = None;

        let result = invoke_auth(&mut client, &authenticator, true).await;
        assert!(matches!(result, Err(LoginError::MissingPhone)));
        assert!(client.requested_phone.is_none());
    }
}
