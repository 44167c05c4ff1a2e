//! One-round-trip device operations.
//!
//! Thin glue between a [`Session`] and the payload codecs: each function
//! performs a single logical exchange and interprets the device's answer.
//! Retry of a busy device happens inside [`Session::communicate`]; the
//! outcomes here are the ones a caller has to act on: found/not found,
//! locked, or a failed conversation.

use chrono::{DateTime, Utc};

use crate::codec::{
    decode_credentials, encode_credentials, encode_date, encode_query, lock_state, Credentials,
    FLIP_BIT_RESET,
};
use crate::error::{Result, VaultError};
use crate::protocol::{Command, Message};
use crate::session::Session;
use crate::transport::VaultTransport;

/// Outcome of a credential lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialLookup {
    /// The device returned a record.
    Found(Credentials),
    /// The device answered, but holds no record for the query. A normal
    /// negative result, not an error.
    NoItem,
    /// The query string was blank.
    InvalidQuery,
    /// The device is locked; unlock it and retry.
    Locked,
    /// The conversation failed (no service, timeout, wrong answer).
    CommFailure,
    /// The device's answer did not parse as a credential record.
    ParseFailure,
}

/// Look up the credentials stored for `query`.
pub async fn get_credentials<T: VaultTransport + 'static>(
    session: &Session<T>,
    query: &str,
) -> CredentialLookup {
    if query.trim().is_empty() {
        return CredentialLookup::InvalidQuery;
    }
    if !session.has_communication_service().await {
        return CredentialLookup::CommFailure;
    }
    if session.is_locked() == Some(true) {
        return CredentialLookup::Locked;
    }
    let _ = session.send_raw(&FLIP_BIT_RESET).await;

    let request = Message::with_payload(Command::GetCredential, encode_query(query, None));
    let Some(answer) = session.communicate(&request).await else {
        return CredentialLookup::CommFailure;
    };
    if answer.command() != Command::GetCredential {
        tracing::warn!(?answer, "lookup answered with wrong command");
        return CredentialLookup::CommFailure;
    }
    if answer.payload().is_empty() {
        return CredentialLookup::NoItem;
    }
    match decode_credentials(query, answer.payload()) {
        Some(creds) => CredentialLookup::Found(creds),
        None => CredentialLookup::ParseFailure,
    }
}

/// Store a credential record on the device.
///
/// The device confirms with a single `1` byte after the user approves the
/// store prompt.
pub async fn store_credentials<T: VaultTransport + 'static>(
    session: &Session<T>,
    service: &str,
    login: &str,
    password: &str,
) -> Result<()> {
    if service.trim().is_empty() {
        return Err(VaultError::Protocol("blank service".into()));
    }
    if !session.has_communication_service().await {
        return Err(VaultError::NoCommService);
    }
    let _ = session.send_raw(&FLIP_BIT_RESET).await;

    let record = encode_credentials(service, Some(login), None, None, Some(password));
    let request = Message::with_payload(Command::StoreCredential, record);
    let answer = session
        .communicate(&request)
        .await
        .ok_or(VaultError::Timeout)?;
    if answer.command() != Command::StoreCredential {
        return Err(VaultError::UnexpectedAnswer("wrong command".into()));
    }
    if answer.payload() != [1] {
        return Err(VaultError::UnexpectedAnswer("store not confirmed".into()));
    }
    Ok(())
}

/// Echo probe: the device must mirror the 4-byte nonce back.
pub async fn ping<T: VaultTransport + 'static>(
    session: &Session<T>,
    nonce: [u8; 4],
) -> Result<()> {
    if !session.has_communication_service().await {
        return Err(VaultError::NoCommService);
    }
    let _ = session.send_raw(&FLIP_BIT_RESET).await;

    let request = Message::with_payload(Command::Ping, nonce.to_vec());
    let answer = session
        .communicate(&request)
        .await
        .ok_or(VaultError::Timeout)?;
    if answer.command() != Command::Ping || answer.payload() != nonce {
        return Err(VaultError::UnexpectedAnswer("ping echo mismatch".into()));
    }
    Ok(())
}

/// Query the device status; returns the lock state from the answer.
///
/// The session's own lock flag updates as a side effect, since the answer
/// travels the notification path like any unsolicited status push.
pub async fn query_status<T: VaultTransport + 'static>(session: &Session<T>) -> Result<bool> {
    if !session.has_communication_service().await {
        return Err(VaultError::NoCommService);
    }
    let answer = session
        .communicate(&Message::new(Command::DeviceStatus))
        .await
        .ok_or(VaultError::Timeout)?;
    if answer.command() != Command::DeviceStatus {
        return Err(VaultError::UnexpectedAnswer("wrong command".into()));
    }
    lock_state(answer.payload())
        .ok_or_else(|| VaultError::UnexpectedAnswer("malformed status payload".into()))
}

/// Push the current UTC date to the device clock.
///
/// Returns [`VaultError::Locked`] without sending when the device is known
/// to be locked.
pub async fn set_date<T: VaultTransport + 'static>(
    session: &Session<T>,
    now: DateTime<Utc>,
) -> Result<()> {
    if !session.has_communication_service().await {
        return Err(VaultError::NoCommService);
    }
    if session.is_locked() == Some(true) {
        return Err(VaultError::Locked);
    }
    let request = Message::with_payload(Command::SetDate, encode_date(now));
    let answer = session
        .communicate(&request)
        .await
        .ok_or(VaultError::Timeout)?;
    if answer.command() != Command::SetDate {
        return Err(VaultError::UnexpectedAnswer("wrong command".into()));
    }
    Ok(())
}
