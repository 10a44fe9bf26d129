//! The abstract interface for speech dialog services.
//!
//! ADR: A dialog is a single async function driving channels. This makes the
//! implementation react on multiple futures at the same time, but keeps error
//! handling and lifetime in one place.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::DialogSession;

#[async_trait]
pub trait Service: fmt::Debug {
    type Params: Send;

    /// Execute a dialog on this service.
    ///
    /// If invalid or unexpected input is received, the function **must**
    /// terminate with an error.
    async fn conversation(&self, params: Self::Params, session: DialogSession) -> Result<()>;
}
