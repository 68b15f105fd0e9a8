// SPDX-FileCopyrightText: 2026 Sendero Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign dispatch, retry, and delivery reconciliation.

pub mod dispatch;
pub mod pacer;
pub mod reconcile;

pub use dispatch::DispatchEngine;
pub use pacer::Pacer;
pub use reconcile::{CallbackPayload, reconcile};

#[cfg(test)]
pub(crate) mod testutil {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use sendero_core::{ProviderGateway, SendOutcome, SendRequest, SenderoError};
    use sendero_store::{CampaignStore, Database};
    use tempfile::tempdir;

    const KEY_HEX: &str =
        "0202020202020202020202020202020202020202020202020202020202020202";

    pub async fn test_store() -> (CampaignStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db = Database::open(dir.path().join("engine.db").to_str().unwrap())
            .await
            .unwrap();
        let store = CampaignStore::new(db, KEY_HEX, 720).unwrap();
        (store, dir)
    }

    /// Scriptable in-memory gateway. With an empty script every send is
    /// accepted with a generated id; otherwise results are consumed front
    /// to back.
    pub struct MockGateway {
        script: Mutex<VecDeque<Result<SendOutcome, SenderoError>>>,
        calls: Mutex<Vec<SendRequest>>,
    }

    impl MockGateway {
        pub fn accepting() -> Self {
            Self::scripted(Vec::new())
        }

        pub fn scripted(outcomes: Vec<SendOutcome>) -> Self {
            Self::scripted_results(outcomes.into_iter().map(Ok).collect())
        }

        pub fn scripted_results(results: Vec<Result<SendOutcome, SenderoError>>) -> Self {
            Self {
                script: Mutex::new(results.into()),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn script(&self, outcomes: Vec<SendOutcome>) {
            self.script_results(outcomes.into_iter().map(Ok).collect());
        }

        pub fn script_results(&self, results: Vec<Result<SendOutcome, SenderoError>>) {
            *self.script.lock().unwrap() = results.into();
        }

        pub fn calls(&self) -> Vec<SendRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProviderGateway for MockGateway {
        async fn send(&self, request: &SendRequest) -> Result<SendOutcome, SenderoError> {
            self.calls.lock().unwrap().push(request.clone());
            let scripted = self.script.lock().unwrap().pop_front();
            scripted.unwrap_or_else(|| {
                Ok(SendOutcome::Accepted {
                    provider_message_id: format!("wamid.{}", uuid::Uuid::new_v4()),
                })
            })
        }
    }
}
