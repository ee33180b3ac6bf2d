//! Request extractors.
//!
//! [`SignedBody`] authenticates RSVP pushes: the `Herald-Signature` header
//! must carry a fresh HMAC over `"{timestamp}.{raw_body}"` made with the
//! configured push secret. Signing itself lives in [`herald_sdk::signature`].

use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use herald_sdk::signature::{SIGNATURE_HEADER, Signature, SignatureError, SignedObject};

use crate::state::AppState;

/// Largest accepted signed body.
const MAX_SIGNED_BODY: usize = 1024 * 1024;

/// A JSON body whose signature checked out against the push secret.
pub struct SignedBody<T: Signature>(pub T);

#[derive(Debug, thiserror::Error)]
pub enum PushAuthError {
    /// No push secret is configured, so nothing can be authenticated.
    #[error("push updates are disabled")]
    Disabled,

    #[error("missing Herald-Signature header")]
    MissingHeader,

    #[error("request body is unreadable or too large")]
    Body,

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

impl PushAuthError {
    fn status(&self) -> StatusCode {
        match self {
            PushAuthError::Disabled => StatusCode::SERVICE_UNAVAILABLE,
            PushAuthError::MissingHeader => StatusCode::UNAUTHORIZED,
            PushAuthError::Body => StatusCode::BAD_REQUEST,
            PushAuthError::Signature(
                SignatureError::SignatureMismatch | SignatureError::Expired,
            ) => StatusCode::UNAUTHORIZED,
            PushAuthError::Signature(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for PushAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status == StatusCode::UNAUTHORIZED {
            tracing::warn!(error = %self, "Rejected unauthenticated push");
        }
        (status, self.to_string()).into_response()
    }
}

impl<T: Signature + Send> FromRequest<AppState> for SignedBody<T> {
    type Rejection = PushAuthError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let Some(secret) = state.push_secret.read().await.clone() else {
            return Err(PushAuthError::Disabled);
        };

        let header = req
            .headers()
            .get(SIGNATURE_HEADER)
            .ok_or(PushAuthError::MissingHeader)?
            .to_str()
            .map_err(|_| SignatureError::InvalidFormat)?
            .to_owned();

        let bytes = axum::body::to_bytes(req.into_body(), MAX_SIGNED_BODY)
            .await
            .map_err(|_| PushAuthError::Body)?;
        let raw = String::from_utf8(bytes.to_vec()).map_err(|_| PushAuthError::Body)?;

        let payload = SignedObject::<T>::from_header_and_body(&header, raw)?.verify(&secret)?;
        Ok(SignedBody(payload))
    }
}
