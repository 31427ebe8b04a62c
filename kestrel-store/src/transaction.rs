// SPDX-License-Identifier: MIT OR Apache-2.0

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, trace, warn};

use crate::traits::{KeyStore, KeyStoreError};

/// Retry behaviour when committing a transaction fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionOptions {
    /// How often a failed commit is attempted again before giving up.
    pub max_commit_retries: usize,

    /// Time to wait between two commit attempts.
    pub delay_between_tries: Duration,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            max_commit_retries: 10,
            delay_between_tries: Duration::from_millis(3000),
        }
    }
}

/// Runs `body` inside a key store transaction.
///
/// All writes `body` issues through the store are committed atomically when it returns `Ok`. When
/// `body` fails, or the commit still fails after all retries, every buffered write is discarded
/// and the error is returned to the caller.
///
/// The label only identifies the transaction in logs.
pub async fn transaction<S, F, R, E>(
    store: &S,
    label: &str,
    options: &TransactionOptions,
    body: F,
) -> Result<R, E>
where
    S: KeyStore,
    F: AsyncFnOnce() -> Result<R, E>,
    E: From<KeyStoreError>,
{
    let permit = store.begin().await?;
    trace!(label, "began key store transaction");

    let result = match body().await {
        Ok(result) => result,
        Err(err) => {
            if let Err(rollback_err) = store.rollback(permit).await {
                error!(label, %rollback_err, "failed rolling back key store transaction");
            }
            debug!(label, "rolled back key store transaction");
            return Err(err);
        }
    };

    let mut attempt = 0;
    loop {
        match store.commit(&permit).await {
            Ok(()) => {
                trace!(label, attempt, "committed key store transaction");
                drop(permit);
                return Ok(result);
            }
            Err(err) if attempt < options.max_commit_retries => {
                attempt += 1;
                warn!(label, attempt, %err, "failed committing key store transaction, retrying");
                tokio::time::sleep(options.delay_between_tries).await;
            }
            Err(err) => {
                error!(label, attempt, %err, "giving up committing key store transaction");
                if let Err(rollback_err) = store.rollback(permit).await {
                    error!(label, %rollback_err, "failed rolling back key store transaction");
                }
                return Err(err.into());
            }
        }
    }
}
