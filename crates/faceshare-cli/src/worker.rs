use faceshare_core::{
    recognize, Analysis, DetectionParams, EngineStatus, FaceEngine, Gallery, Image, PipelineError,
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from command handlers to the engine thread.
enum EngineRequest {
    Analyze {
        image: Image,
        params: DetectionParams,
        reply: oneshot::Sender<Result<Analysis, PipelineError>>,
    },
    Recognize {
        image: Image,
        params: DetectionParams,
        gallery: Arc<Gallery>,
        threshold: f32,
        reply: oneshot::Sender<Result<Analysis, PipelineError>>,
    },
    Status {
        reply: oneshot::Sender<EngineStatus>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Detect every face in `image` and embed each one.
    pub async fn analyze(
        &self,
        image: Image,
        params: DetectionParams,
    ) -> Result<Analysis, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Analyze {
            image,
            params,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }

    /// Analyze `image` and match each face against `gallery`.
    pub async fn recognize(
        &self,
        image: Image,
        params: DetectionParams,
        gallery: Arc<Gallery>,
        threshold: f32,
    ) -> Result<Analysis, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Recognize {
            image,
            params,
            gallery,
            threshold,
            reply,
        })
        .await?;
        Ok(rx.await.map_err(|_| WorkerError::ChannelClosed)??)
    }

    pub async fn status(&self) -> Result<EngineStatus, WorkerError> {
        let (reply, rx) = oneshot::channel();
        self.send(EngineRequest::Status { reply }).await?;
        rx.await.map_err(|_| WorkerError::ChannelClosed)
    }

    async fn send(&self, request: EngineRequest) -> Result<(), WorkerError> {
        self.tx
            .send(request)
            .await
            .map_err(|_| WorkerError::ChannelClosed)
    }
}

/// Run `engine` on a dedicated OS thread.
///
/// Model sessions are not shared: the thread owns the engine and serves
/// requests one at a time in arrival order. The thread exits once every
/// handle has been dropped.
pub fn spawn_engine(mut engine: Box<dyn FaceEngine>) -> Result<EngineHandle, WorkerError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("faceshare-engine".into())
        .spawn(move || {
            tracing::info!(engine = engine.status().engine, "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Analyze {
                        image,
                        params,
                        reply,
                    } => {
                        let _ = reply.send(engine.analyze(&image, &params));
                    }
                    EngineRequest::Recognize {
                        image,
                        params,
                        gallery,
                        threshold,
                        reply,
                    } => {
                        let result =
                            recognize(engine.as_mut(), &image, &params, &gallery, threshold);
                        let _ = reply.send(result);
                    }
                    EngineRequest::Status { reply } => {
                        let _ = reply.send(engine.status());
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx })
}
