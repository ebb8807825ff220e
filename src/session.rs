//! Lazy API session management.
//!
//! The API requires an initial `LogonUser` call whose result embeds a
//! session-scoped client identifier; nearly every subsequent call must
//! carry it. The session authenticates once per process and caches the
//! identifier for the rest of the client's lifetime — there is no logout
//! or refresh in the contract.

use serde_json::{Value, json};

use crate::error::OktawaveError;
use crate::soap::{CallOptions, SoapTransport};
use crate::value::dive_i64;

// WCF serializes the logon result through a compiler-generated backing
// field, which the element-name normalization turns into this key.
const CLIENT_ID_PATH: [&str; 4] = [
    "logon_user_response",
    "logon_user_result",
    "_x003_c_client_x003_e_k__backing_field",
    "client_id",
];

/// Transport seam the session dispatches through. Implemented by
/// [`SoapTransport`]; tests substitute a fake that counts logon RPCs.
#[allow(async_fn_in_trait)] // trait is internal-only
pub trait SoapCall {
    async fn call(
        &mut self,
        method: &str,
        args: &Value,
        options: CallOptions,
    ) -> Result<Value, OktawaveError>;
}

impl SoapCall for SoapTransport {
    async fn call(
        &mut self,
        method: &str,
        args: &Value,
        options: CallOptions,
    ) -> Result<Value, OktawaveError> {
        SoapTransport::call(self, method, args, options).await
    }
}

pub struct Session {
    login: String,
    password: String,
    client_id: Option<i64>,
}

impl Session {
    pub fn new(login: &str, password: &str) -> Self {
        Session {
            login: login.to_string(),
            password: password.to_string(),
            client_id: None,
        }
    }

    /// Authenticate unless a client id is already cached.
    ///
    /// A logon that succeeds at the transport level but yields no client
    /// id is a credential or contract-shape problem, not a transient
    /// fault: it fails with [`OktawaveError::AuthenticationFailed`] and is
    /// never retried.
    pub async fn ensure<T: SoapCall>(&mut self, transport: &mut T) -> Result<(), OktawaveError> {
        if self.client_id.is_some() {
            return Ok(());
        }
        let response = transport
            .call(
                "logon_user",
                &json!({
                    "user": self.login,
                    "password": self.password,
                    "ipAddress": "127.0.0.1",
                    "userAgent": "oktawave-cli",
                }),
                CallOptions {
                    no_auto_dive: true,
                    ..CallOptions::common()
                },
            )
            .await?;
        match dive_i64(&response, &CLIENT_ID_PATH) {
            Some(id) => {
                tracing::debug!(client_id = id, "logged in");
                self.client_id = Some(id);
                Ok(())
            }
            None => Err(OktawaveError::AuthenticationFailed),
        }
    }

    /// The cached client identifier, authenticating first if needed.
    pub async fn client_id<T: SoapCall>(
        &mut self,
        transport: &mut T,
    ) -> Result<i64, OktawaveError> {
        self.ensure(transport).await?;
        // ensure() either caches an id or errors out.
        self.client_id.ok_or(OktawaveError::AuthenticationFailed)
    }
}
