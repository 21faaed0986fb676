//! Async single-axis view of a blocking controller.
//!
//! [`AsyncStage`] implements [`Movable`] for one axis. Several stages can share one
//! [`Controller`]; the mutex serialises their calls so the request/reply order on the
//! wire is preserved. Every call runs on a blocking worker thread.

use crate::controller::Controller;
use anyhow::{Context, Result};
use async_trait::async_trait;
use stage_core::{Family, MotionController, Movable, StageResult};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Shared handle to a blocking controller.
pub type SharedController = Arc<Mutex<Controller>>;

/// One axis of a shared [`Controller`], usable from async code.
#[derive(Debug, Clone)]
pub struct AsyncStage {
    controller: SharedController,
    family: Family,
    axis: u8,
}

impl AsyncStage {
    /// Take ownership of `controller` and expose `axis`.
    pub fn new(controller: Controller, axis: u8) -> StageResult<Self> {
        let family = controller.family();
        family.validate_axis(axis)?;
        Ok(Self {
            controller: Arc::new(Mutex::new(controller)),
            family,
            axis,
        })
    }

    /// Another axis of the same controller.
    pub fn for_axis(&self, axis: u8) -> StageResult<Self> {
        self.family.validate_axis(axis)?;
        Ok(Self {
            controller: Arc::clone(&self.controller),
            family: self.family,
            axis,
        })
    }

    /// Axis driven by this stage.
    pub fn axis(&self) -> u8 {
        self.axis
    }

    /// The shared controller.
    pub fn controller(&self) -> SharedController {
        Arc::clone(&self.controller)
    }

    async fn run_blocking<T, F>(&self, operation: &'static str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Controller, u8) -> StageResult<T> + Send + 'static,
    {
        let controller = Arc::clone(&self.controller);
        let axis = self.axis;
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = controller.blocking_lock();
            f(&mut *guard, axis)
        })
        .await
        .with_context(|| format!("{operation} worker failed"))?;
        result.with_context(|| format!("OptoSigma {} axis {axis}: {operation} failed", self.family))
    }
}

#[async_trait]
impl Movable for AsyncStage {
    async fn move_abs(&self, position: i64) -> Result<()> {
        self.run_blocking("move_abs", move |c, axis| c.move_to(position, axis).map(|_| ()))
            .await
    }

    async fn move_rel(&self, distance: i64) -> Result<()> {
        self.run_blocking("move_rel", move |c, axis| {
            c.move_relative(distance, axis).map(|_| ())
        })
        .await
    }

    async fn position(&self) -> Result<i64> {
        self.run_blocking("position", |c, axis| c.query_position(axis))
            .await
    }

    async fn wait_settled(&self) -> Result<()> {
        self.run_blocking("wait_settled", |c, axis| c.wait_ready(axis).map(|_| ()))
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.run_blocking("stop", |c, axis| c.stop(axis)).await
    }
}
