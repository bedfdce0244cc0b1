//! Process-wide handle to the loaded annotator.
//!
//! The annotator is built at most once. Concurrent first callers wait on a single
//! load instead of racing; a failed load leaves the handle empty so the next caller
//! tries again.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use clinex_ner::{HubLoader, ModelHandle, NerConfig};
//!
//! # async fn run() -> clinex_ner::Result<()> {
//! let handle = ModelHandle::lazy(Arc::new(HubLoader::new(NerConfig::default())));
//! let annotator = handle.get().await?; // loads on first use
//! let predictions = annotator.annotate("Patient reports fever.")?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::{Annotator, AnnotatorLoader, LoadPolicy, NerError, Result};

pub struct ModelHandle {
    inner: Arc<Inner>,
}

struct Inner {
    loader: Arc<dyn AnnotatorLoader>,
    annotator: OnceCell<Arc<dyn Annotator>>,
}

impl Inner {
    async fn load(&self) -> Result<Arc<dyn Annotator>> {
        let annotator = self
            .annotator
            .get_or_try_init(|| async {
                let start = Instant::now();
                let name = self.loader.describe();
                info!("Loading model: {}", name);
                let annotator = self.loader.load().await?;
                info!("Model {} ready in {:?}", name, start.elapsed());
                Ok::<_, NerError>(annotator)
            })
            .await?;
        Ok(Arc::clone(annotator))
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.model_name())
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ModelHandle {
    /// A handle that loads on first [`get`](Self::get).
    pub fn lazy(loader: Arc<dyn AnnotatorLoader>) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                annotator: OnceCell::new(),
            }),
        }
    }

    /// Load immediately; the error is returned to the caller.
    pub async fn eager(loader: Arc<dyn AnnotatorLoader>) -> Result<Self> {
        let handle = Self::lazy(loader);
        handle.get().await?;
        Ok(handle)
    }

    /// Wrap an annotator that is already built.
    pub fn ready(annotator: Arc<dyn Annotator>) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader: Arc::new(Preloaded(Arc::clone(&annotator))),
                annotator: OnceCell::new_with(Some(annotator)),
            }),
        }
    }

    /// Build a handle according to `policy`.
    ///
    /// `Eager` fails if the load fails. `Warm` spawns a background load whose
    /// failure is only logged. `Lazy` does nothing until the first request.
    pub async fn with_policy(loader: Arc<dyn AnnotatorLoader>, policy: LoadPolicy) -> Result<Arc<Self>> {
        match policy {
            LoadPolicy::Eager => Ok(Arc::new(Self::eager(loader).await?)),
            LoadPolicy::Lazy => Ok(Arc::new(Self::lazy(loader))),
            LoadPolicy::Warm => {
                let handle = Arc::new(Self::lazy(loader));
                handle.warm_up();
                Ok(handle)
            }
        }
    }

    /// Start loading in the background. A failure is logged and the next
    /// [`get`](Self::get) retries.
    pub fn warm_up(self: &Arc<Self>) -> JoinHandle<()> {
        let handle = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = handle.get().await {
                warn!(
                    "Background load of {} failed, will retry on next request: {}",
                    handle.model_name(),
                    e
                );
            }
        })
    }

    /// The annotator, loading it if this is the first successful call.
    ///
    /// The load runs on its own task, so a caller that is dropped mid-load
    /// does not cancel it; later callers wait for the same attempt.
    pub async fn get(&self) -> Result<Arc<dyn Annotator>> {
        if let Some(annotator) = self.inner.annotator.get() {
            return Ok(Arc::clone(annotator));
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.load().await })
            .await
            .map_err(|e| NerError::ModelLoad(format!("model load task failed: {}", e)))?
    }

    pub fn is_loaded(&self) -> bool {
        self.inner.annotator.initialized()
    }

    pub fn model_name(&self) -> String {
        self.inner.loader.describe()
    }
}

struct Preloaded(Arc<dyn Annotator>);

#[async_trait]
impl AnnotatorLoader for Preloaded {
    async fn load(&self) -> Result<Arc<dyn Annotator>> {
        Ok(Arc::clone(&self.0))
    }

    fn describe(&self) -> String {
        "preloaded".to_string()
    }
}
