//! Headless host demo.
//!
//! Runs the host loop over `demos/plugins` with a console presenter:
//! frames are summarized on stdout instead of rendered. Edit
//! `demos/plugins/pendulum/game.rhai` while it runs to watch a live
//! reload; press nothing, it stops by itself after ten seconds.
//!
//! With `GEMINI_API_KEY` set the patch pipeline talks to the real
//! service; otherwise a stub generator echoes the source back.
//!
//! Run with: cargo run --example host_demo

use std::sync::Arc;
use std::time::Duration;

use gamedock::{CodeGenerator, Frame, HostConfig, HostEvent, HostLoop, Presenter};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

struct ConsolePresenter {
    frames: u64,
    budget: u64,
}

impl Presenter for ConsolePresenter {
    fn poll_events(&mut self) -> Vec<HostEvent> {
        if self.frames >= self.budget {
            vec![HostEvent::Shutdown]
        } else {
            Vec::new()
        }
    }

    fn present(&mut self, frame: &Frame) {
        self.frames += 1;
        if frame.tick % 60 == 0 {
            info!(
                tick = frame.tick,
                plugin = frame.plugin.as_deref().unwrap_or("-"),
                status = %frame.status,
                primitives = frame.draw.len(),
                "frame"
            );
            if let Some(diagnostic) = &frame.diagnostic {
                info!(%diagnostic, "last load failure");
            }
        }
    }
}

fn echo_generator() -> Arc<dyn CodeGenerator> {
    Arc::new(|source: &str, _goal: &str| Ok(format!("```rhai\n{source}\n```")))
}

#[cfg(feature = "http")]
fn generator() -> Arc<dyn CodeGenerator> {
    match gamedock::GeminiClient::from_env() {
        Ok(client) => Arc::new(client),
        Err(err) => {
            info!(error = %err, "falling back to echo generator");
            echo_generator()
        }
    }
}

#[cfg(not(feature = "http"))]
fn generator() -> Arc<dyn CodeGenerator> {
    echo_generator()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = HostConfig::new()
        .with_plugin_root("demos/plugins")
        .with_tick(Duration::from_secs(1) / 60);

    let mut host = HostLoop::new(config, generator())?;
    info!(plugins = ?host.plugin_names(), "discovered");

    let mut presenter = ConsolePresenter { frames: 0, budget: 600 };
    host.run(&mut presenter);

    Ok(())
}
