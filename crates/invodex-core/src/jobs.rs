//! Background maintenance.
//!
//! One loop, decoupled from the write path: retries pending embeddings from
//! the outbox and rebuilds a provider's ANN index once its corpus has grown
//! past the configured factor since the last rebuild. Queries keep running
//! against the old index while a rebuild is in flight, so new vectors may
//! be missing from approximate results until the swap - accepted staleness.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use invodex_embeddings::release_process_model;
use invodex_types::IndexSettings;

use crate::error::CoreError;
use crate::service::Invodex;

/// Maintenance loop configuration.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub interval: Duration,
    /// Pending embeddings retried per pass.
    pub batch_size: usize,
    /// Rebuild a provider's index when its corpus has grown by this factor
    /// since the last rebuild.
    pub rebuild_growth_factor: f32,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(300),
            batch_size: 64,
            rebuild_growth_factor: 1.5,
        }
    }
}

impl MaintenanceConfig {
    pub fn from_settings(settings: &IndexSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.rebuild_interval_secs),
            batch_size: 64,
            rebuild_growth_factor: settings.rebuild_growth_factor,
        }
    }
}

/// Result of one maintenance pass.
#[derive(Debug, Default, Clone)]
pub struct MaintenanceStats {
    /// Pending records that became searchable this pass.
    pub embedded: usize,
    /// Providers whose index was rebuilt this pass.
    pub rebuilt: Vec<String>,
}

/// The maintenance job.
pub struct MaintenanceJob {
    service: Arc<Invodex>,
    config: MaintenanceConfig,
    /// Corpus size per provider at its last rebuild (or first observation).
    baselines: Mutex<HashMap<String, usize>>,
}

impl MaintenanceJob {
    pub fn new(service: Arc<Invodex>, config: MaintenanceConfig) -> Self {
        Self {
            service,
            config,
            baselines: Mutex::new(HashMap::new()),
        }
    }

    /// One maintenance pass: retry pending embeddings, then rebuild any
    /// provider index that has outgrown its baseline.
    pub async fn run_once(&self) -> Result<MaintenanceStats, CoreError> {
        let mut stats = MaintenanceStats {
            embedded: self
                .service
                .retry_pending_embeddings(self.config.batch_size)
                .await?,
            ..Default::default()
        };

        let vectors = self.service.vector_store();
        for provider_id in vectors.providers()? {
            let stored = vectors.count(&provider_id)?;
            let baseline = {
                let mut baselines = self
                    .baselines
                    .lock()
                    .map_err(|e| CoreError::Config(e.to_string()))?;
                match baselines.get(&provider_id) {
                    Some(&b) => b,
                    None => {
                        // First observation sets the baseline; no rebuild.
                        baselines.insert(provider_id.clone(), stored);
                        continue;
                    }
                }
            };

            let grown = stored > baseline
                && stored as f32 >= baseline.max(1) as f32 * self.config.rebuild_growth_factor;
            if grown {
                let rebuilt = vectors.rebuild(&provider_id)?;
                self.baselines
                    .lock()
                    .map_err(|e| CoreError::Config(e.to_string()))?
                    .insert(provider_id.clone(), rebuilt.vectors);
                stats.rebuilt.push(provider_id);
            }
        }

        if stats.embedded > 0 || !stats.rebuilt.is_empty() {
            info!(
                embedded = stats.embedded,
                rebuilt = ?stats.rebuilt,
                "Maintenance pass complete"
            );
        } else {
            debug!("Maintenance pass: nothing to do");
        }
        Ok(stats)
    }

    /// Run the loop until the shutdown signal flips, then release the
    /// process-wide embedding model.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            // The first tick fires immediately; skip it so a fresh start
            // is not also an immediate maintenance pass.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "Maintenance pass failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }

            release_process_model();
            info!("Maintenance job stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    use invodex_embeddings::{
        Embedding, EmbeddingError, EmbeddingProvider, EncodeMode, ProviderChain,
    };
    use invodex_types::Settings;

    /// Fails its first `fail_first` encodes, then works. Models a provider
    /// outage that ends.
    struct FlakyProvider {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl EmbeddingProvider for FlakyProvider {
        fn id(&self) -> &str {
            "flaky"
        }

        fn dimension(&self) -> usize {
            16
        }

        async fn encode(
            &self,
            text: &str,
            _mode: EncodeMode,
        ) -> Result<Embedding, EmbeddingError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(EmbeddingError::Api("temporarily down".to_string()));
            }
            let mut values = vec![0.0f32; 16];
            for (i, b) in text.bytes().enumerate() {
                values[(b as usize + i) % 16] += 1.0;
            }
            Ok(Embedding::new(values))
        }

        async fn health_check(&self) -> Result<(), EmbeddingError> {
            Ok(())
        }
    }

    fn service_with_flaky(temp: &TempDir, fail_first: usize) -> Arc<Invodex> {
        let mut settings = Settings::default();
        settings.db_path = temp.path().join("db").to_string_lossy().to_string();
        settings.template_dir = Some(temp.path().join("templates").to_string_lossy().to_string());

        let chain = ProviderChain::new(Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first,
        }));
        Arc::new(Invodex::new(settings, chain, None).unwrap())
    }

    fn invoice(number: u32, amount: &str) -> Vec<u8> {
        format!(
            "Amazon Web Services\nInvoice Number: {}\nInvoice Date: 06/01/2025\nTotal Due: ${}\n",
            number, amount
        )
        .into_bytes()
    }

    #[tokio::test]
    async fn test_pending_embedding_retried_until_ready() {
        let temp = TempDir::new().unwrap();
        let service = service_with_flaky(&temp, 1);

        // Provider down at submit time: record persists as pending.
        let receipt = service.submit(&invoice(1, "10.00")).await.unwrap();
        assert!(!receipt.embedded);

        let job = MaintenanceJob::new(service.clone(), MaintenanceConfig::default());
        let stats = job.run_once().await.unwrap();
        assert_eq!(stats.embedded, 1);

        // Now searchable.
        let similar = service.semantic_search("invoice", 5).await.unwrap();
        assert_eq!(similar.len(), 1);

        // Nothing left to do.
        let stats = job.run_once().await.unwrap();
        assert_eq!(stats.embedded, 0);
    }

    #[tokio::test]
    async fn test_index_rebuilt_after_growth() {
        let temp = TempDir::new().unwrap();
        let service = service_with_flaky(&temp, 0);
        let job = MaintenanceJob::new(service.clone(), MaintenanceConfig::default());

        service.submit(&invoice(1, "10.00")).await.unwrap();

        // First pass sets the baseline (1 vector), no rebuild.
        let stats = job.run_once().await.unwrap();
        assert!(stats.rebuilt.is_empty());

        service.submit(&invoice(2, "20.00")).await.unwrap();
        service.submit(&invoice(3, "30.00")).await.unwrap();

        // 3 >= 1 * 1.5: rebuild.
        let stats = job.run_once().await.unwrap();
        assert_eq!(stats.rebuilt, vec!["flaky".to_string()]);

        // Baseline moved to 3; no repeat rebuild without growth.
        let stats = job.run_once().await.unwrap();
        assert!(stats.rebuilt.is_empty());
    }
}
