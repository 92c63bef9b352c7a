//! Scriptable mock certificate authority
//!
//! Implements the CA port in-process so the issuance pipeline can be
//! exercised end-to-end without the commercial vendor. Batches issue
//! real self-signed PKCS#12 bundles encrypted with the password the
//! caller submitted in the batch parameters, so the download path goes
//! through genuine decode and X.509 parsing.

use async_trait::async_trait;
use chrono::Utc;
use p12::PFX;
use rcgen::{CertificateParams, DnType, KeyPair};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::ports::ca::{
    self, BatchDetail, BatchInfo, CaError, CertificateAuthority, ProcessingInfo,
};

/// One scripted batch held by the mock
#[derive(Debug, Clone)]
pub struct ScriptedBatch {
    /// Common name submitted with the batch
    pub common_name: String,
    /// PKCS#12 password submitted with the batch
    pub password: String,
    /// Current batch status string
    pub status: String,
    /// Counters returned from processing info
    pub processing: ProcessingInfo,
    /// Rejection reason returned from batch detail
    pub reject_reason: Option<String>,
}

#[derive(Default)]
struct MockCaState {
    balance: i64,
    offline: bool,
    auto_issue: bool,
    next_batch_id: i64,
    batches: HashMap<i64, ScriptedBatch>,
    calls: Vec<String>,
}

/// Scriptable in-process certificate authority
#[derive(Clone)]
pub struct MockCa {
    state: Arc<Mutex<MockCaState>>,
}

impl Default for MockCa {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCa {
    /// Create a mock with a positive balance that issues every batch
    /// as soon as it is polled
    pub fn new() -> Self {
        MockCa {
            state: Arc::new(Mutex::new(MockCaState {
                balance: 100,
                offline: false,
                auto_issue: true,
                next_batch_id: 0,
                batches: HashMap::new(),
                calls: Vec::new(),
            })),
        }
    }

    /// Script the available license balance
    pub fn set_balance(&self, balance: i64) {
        self.state.lock().unwrap().balance = balance;
    }

    /// When offline, every call fails with a transport error
    pub fn set_offline(&self, offline: bool) {
        self.state.lock().unwrap().offline = offline;
    }

    /// When disabled, created batches stay active until scripted
    pub fn set_auto_issue(&self, auto_issue: bool) {
        self.state.lock().unwrap().auto_issue = auto_issue;
    }

    /// Mark a batch as succeeded and ready for download
    pub fn complete_batch(&self, batch_id: i64) {
        if let Some(batch) = self.state.lock().unwrap().batches.get_mut(&batch_id) {
            batch.status = ca::status::READY_FOR_DOWNLOAD.to_string();
            batch.processing = ProcessingInfo {
                active: 0,
                success: 1,
                failed: 0,
            };
        }
    }

    /// Mark a batch as rejected with the given reason
    pub fn reject_batch(&self, batch_id: i64, reason: &str) {
        if let Some(batch) = self.state.lock().unwrap().batches.get_mut(&batch_id) {
            batch.status = ca::status::REJECTED.to_string();
            batch.reject_reason = Some(reason.to_string());
            batch.processing = ProcessingInfo {
                active: 0,
                success: 0,
                failed: 1,
            };
        }
    }

    /// Mark a batch as malformed (not acceptable)
    pub fn fail_batch(&self, batch_id: i64) {
        if let Some(batch) = self.state.lock().unwrap().batches.get_mut(&batch_id) {
            batch.status = ca::status::NOT_ACCEPTABLE.to_string();
            batch.processing = ProcessingInfo {
                active: 0,
                success: 0,
                failed: 1,
            };
        }
    }

    /// Snapshot of a scripted batch, for assertions
    pub fn batch(&self, batch_id: i64) -> Option<ScriptedBatch> {
        self.state.lock().unwrap().batches.get(&batch_id).cloned()
    }

    /// RPC names invoked so far, in call order
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    fn record(&self, call: &str) -> Result<(), CaError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        if state.offline {
            return Err(CaError::Transport("connection refused".into()));
        }
        Ok(())
    }

    /// Issue a self-signed bundle for the batch's common name, encrypted
    /// with the password submitted at batch creation
    fn issue_bundle(common_name: &str, password: &str) -> Result<Vec<u8>, CaError> {
        let key_pair = KeyPair::generate()
            .map_err(|e| CaError::Protocol(format!("key generation failed: {e}")))?;
        let mut params = CertificateParams::new(vec![common_name.to_string()])
            .map_err(|e| CaError::Protocol(format!("certificate params: {e}")))?;
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);

        let not_before = time::OffsetDateTime::now_utc() - time::Duration::days(1);
        let not_after = time::OffsetDateTime::now_utc() + time::Duration::days(365);
        params.not_before = not_before;
        params.not_after = not_after;

        let cert = params
            .self_signed(&key_pair)
            .map_err(|e| CaError::Protocol(format!("self-sign failed: {e}")))?;

        let pfx = PFX::new(
            cert.der().as_ref(),
            &key_pair.serialize_der(),
            None,
            password,
            common_name,
        )
        .ok_or_else(|| CaError::Protocol("pkcs12 packaging failed".into()))?;
        Ok(pfx.to_der())
    }
}

#[async_trait]
impl CertificateAuthority for MockCa {
    async fn user_available_balance(&self) -> Result<i64, CaError> {
        self.record("user_available_balance")?;
        Ok(self.state.lock().unwrap().balance)
    }

    async fn create_batch(
        &self,
        _profile: &str,
        params: &HashMap<String, String>,
    ) -> Result<BatchInfo, CaError> {
        self.record("create_batch")?;
        let mut state = self.state.lock().unwrap();
        state.next_batch_id += 1;
        let batch_id = state.next_batch_id;

        let auto_issue = state.auto_issue;
        let batch = ScriptedBatch {
            common_name: params
                .get(ca::PARAM_COMMON_NAME)
                .cloned()
                .unwrap_or_default(),
            password: params
                .get(ca::PARAM_PKCS12_PASSWORD)
                .cloned()
                .unwrap_or_default(),
            status: if auto_issue {
                ca::status::READY_FOR_DOWNLOAD.to_string()
            } else {
                "CREATED".to_string()
            },
            processing: if auto_issue {
                ProcessingInfo {
                    active: 0,
                    success: 1,
                    failed: 0,
                }
            } else {
                ProcessingInfo {
                    active: 1,
                    success: 0,
                    failed: 0,
                }
            },
            reject_reason: None,
        };
        let status = batch.status.clone();
        state.batches.insert(batch_id, batch);

        Ok(BatchInfo {
            batch_id,
            authority_id: 1,
            order_number: 1000 + batch_id,
            creation_date: Utc::now().to_rfc3339(),
            status,
        })
    }

    async fn batch_detail(&self, batch_id: i64) -> Result<BatchDetail, CaError> {
        self.record("batch_detail")?;
        let state = self.state.lock().unwrap();
        let batch = state
            .batches
            .get(&batch_id)
            .ok_or_else(|| CaError::Protocol(format!("unknown batch {batch_id}")))?;
        Ok(BatchDetail {
            batch_id,
            batch_name: format!("batch-{batch_id}"),
            status: batch.status.clone(),
            reject_reason: batch.reject_reason.clone(),
        })
    }

    async fn batch_status(&self, batch_id: i64) -> Result<String, CaError> {
        self.record("batch_status")?;
        let state = self.state.lock().unwrap();
        state
            .batches
            .get(&batch_id)
            .map(|b| b.status.clone())
            .ok_or_else(|| CaError::Protocol(format!("unknown batch {batch_id}")))
    }

    async fn batch_processing_info(&self, batch_id: i64) -> Result<ProcessingInfo, CaError> {
        self.record("batch_processing_info")?;
        let state = self.state.lock().unwrap();
        state
            .batches
            .get(&batch_id)
            .map(|b| b.processing)
            .ok_or_else(|| CaError::Protocol(format!("unknown batch {batch_id}")))
    }

    async fn download(&self, batch_id: i64) -> Result<Vec<u8>, CaError> {
        self.record("download")?;
        let (common_name, password) = {
            let state = self.state.lock().unwrap();
            let batch = state
                .batches
                .get(&batch_id)
                .ok_or_else(|| CaError::Protocol(format!("unknown batch {batch_id}")))?;
            if batch.processing.success == 0 {
                return Err(CaError::Transport(format!("batch {batch_id} not ready")));
            }
            (batch.common_name.clone(), batch.password.clone())
        };
        Self::issue_bundle(&common_name, &password)
    }
}
