// SPDX-License-Identifier: MIT OR Apache-2.0

use std::convert::Infallible;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Pair of a linked-identifier and a phone-number address belonging to the same user.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LidMapping {
    pub lid: String,
    pub pn: String,
}

impl LidMapping {
    pub fn new(lid: impl Into<String>, pn: impl Into<String>) -> Self {
        Self {
            lid: lid.into(),
            pn: pn.into(),
        }
    }
}

/// Remote batch lookup translating normalized phone-number users into linked identifiers.
///
/// Returned pairs may name the linked identifier as a bare user without server.
pub trait DirectoryResolver {
    type Error: Display;

    fn resolve_batch(
        &self,
        users: &[String],
    ) -> impl Future<Output = Result<Vec<LidMapping>, Self::Error>>;
}

/// Placeholder for a mapping store without a directory resolver.
#[derive(Clone, Copy, Debug)]
pub enum NoResolver {}

impl DirectoryResolver for NoResolver {
    type Error = Infallible;

    async fn resolve_batch(&self, _users: &[String]) -> Result<Vec<LidMapping>, Self::Error> {
        match *self {}
    }
}
