//! Asynchronous code-patch pipeline.
//!
//! One detached worker thread per request: send the plugin's source and a
//! goal to a [`CodeGenerator`], extract the fenced payload, and overwrite
//! the entry file if the payload does not look like an error. The pipeline
//! never triggers a reload itself; the watcher observes the file write and
//! raises the reload signal on its own. Its only shared touchpoint with
//! the rest of the system is the filesystem.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;

use crate::error::{Error, Result};

/// Code-generation collaborator: one blocking round trip per request.
///
/// Implemented by [`GeminiClient`](crate::codegen::GeminiClient) for the
/// real service and by plain closures in tests.
pub trait CodeGenerator: Send + Sync {
    /// Produce a full-file rewrite of `source` toward `goal`.
    ///
    /// The response is free text, possibly containing a fenced code block.
    fn generate(&self, source: &str, goal: &str) -> Result<String>;
}

impl<F> CodeGenerator for F
where
    F: Fn(&str, &str) -> Result<String> + Send + Sync,
{
    fn generate(&self, source: &str, goal: &str) -> Result<String> {
        self(source, goal)
    }
}

/// One unit of patch work: which plugin, where its entry file lives, the
/// current source, and the free-text goal.
#[derive(Debug, Clone)]
pub struct PatchRequest {
    /// Plugin name, used for the in-flight guard.
    pub plugin: String,
    /// Entry-point file to overwrite on success.
    pub entry: PathBuf,
    /// Current source text.
    pub source: String,
    /// Free-text goal description.
    pub goal: String,
}

/// Extract the code payload from a generator response.
///
/// A ` ```rhai ` fence wins over a bare fence; without any fence the whole
/// response is the payload. Leading and trailing whitespace is trimmed.
pub fn extract_code_block(text: &str) -> &str {
    for fence in ["```rhai", "```"] {
        if let Some(start) = text.find(fence) {
            let rest = &text[start + fence.len()..];
            if let Some(end) = rest.find("```") {
                return rest[..end].trim();
            }
        }
    }
    text.trim()
}

/// Heuristic for payloads that are an error marker rather than code:
/// short and containing "Error".
///
/// Deliberately crude; it can misclassify a legitimately short snippet,
/// but no better policy is evident from the collaborator's behavior.
pub fn looks_like_error(payload: &str) -> bool {
    payload.len() < 100 && payload.contains("Error")
}

/// Dispatches patch requests to detached worker threads.
///
/// At most one request may be in flight per plugin; a second request
/// before completion is rejected with [`Error::PatchInFlight`]. Workers
/// never touch the physics world or any plugin instance.
pub struct PatchPipeline {
    generator: Arc<dyn CodeGenerator>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl PatchPipeline {
    /// Create a pipeline over the given generator.
    pub fn new(generator: Arc<dyn CodeGenerator>) -> Self {
        Self {
            generator,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Check whether a request is outstanding for the plugin.
    pub fn in_flight(&self, plugin: &str) -> bool {
        self.in_flight.lock().contains(plugin)
    }

    /// Spawn one worker for the request.
    ///
    /// The worker performs the round trip, applies the error-marker check,
    /// and overwrites the entry file in full when the payload passes. On a
    /// generator failure the payload becomes a short error marker and no
    /// write occurs.
    pub fn request(&self, request: PatchRequest) -> Result<()> {
        {
            let mut in_flight = self.in_flight.lock();
            if !in_flight.insert(request.plugin.clone()) {
                return Err(Error::PatchInFlight(request.plugin));
            }
        }

        tracing::info!(plugin = %request.plugin, goal = %request.goal, "patch requested");

        let generator = self.generator.clone();
        let in_flight = self.in_flight.clone();
        let handle = std::thread::spawn(move || {
            let payload = match generator.generate(&request.source, &request.goal) {
                Ok(response) => extract_code_block(&response).to_string(),
                Err(err) => format!("// Patch Error: {err}"),
            };

            if looks_like_error(&payload) {
                tracing::warn!(plugin = %request.plugin, payload = %payload, "patch payload looks like an error, write skipped");
            } else {
                match std::fs::write(&request.entry, &payload) {
                    Ok(()) => tracing::info!(
                        plugin = %request.plugin,
                        bytes = payload.len(),
                        "patched source written"
                    ),
                    Err(err) => tracing::error!(
                        plugin = %request.plugin,
                        error = %err,
                        "failed to write patched source"
                    ),
                }
            }

            in_flight.lock().remove(&request.plugin);
        });

        self.workers.lock().push(handle);
        Ok(())
    }

    /// Join all outstanding workers.
    ///
    /// No mid-flight cancellation: a write that lands during teardown is
    /// fine, since file persistence outlives the process.
    pub fn shutdown(&self) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("patch worker panicked");
            }
        }
    }
}

impl std::fmt::Debug for PatchPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatchPipeline")
            .field("in_flight", &self.in_flight.lock().len())
            .field("workers", &self.workers.lock().len())
            .finish()
    }
}

impl Drop for PatchPipeline {
    fn drop(&mut self) {
        self.shutdown();
    }
}
