use super::DbPool;
use crate::errors::SqliteStorageError;
use diesel::SqliteConnection;
use log::error;
use pricecache_core::errors::{Error, Result, StorageError};
use pricecache_core::RetryPolicy;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

// Type alias for the job to be executed by the writer actor.
// It takes a mutable reference to a SqliteConnection and returns a core Result.
type Job<T> = Box<dyn FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static>;

type ErasedJob = Job<Box<dyn Any + Send + 'static>>;
type Reply = oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>;

/// Handle for sending jobs to the writer actor.
#[derive(Clone)]
pub struct WriteHandle {
    // Each job is a boxed closure, and a oneshot sender is used for the reply.
    // The Box<dyn Any + Send> is used for type erasure of the job's return type.
    tx: mpsc::Sender<(ErasedJob, Reply)>,
}

impl WriteHandle {
    /// Executes a database job on the writer actor's dedicated connection,
    /// inside an immediate transaction.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .map_err(|_| {
                Error::Storage(StorageError::Fault(
                    "Writer actor stopped; its job channel is closed".to_string(),
                ))
            })?;

        let boxed = ret_rx.await.map_err(|_| {
            Error::Storage(StorageError::Fault(
                "Writer actor dropped the reply without sending a result".to_string(),
            ))
        })??;

        boxed
            .downcast::<T>()
            .map(|v| *v)
            .map_err(|_| Error::Unexpected("Failed to downcast writer actor result".to_string()))
    }

    /// Like [`exec`](Self::exec), re-running the job while SQLite reports the
    /// database as busy.
    ///
    /// A job still busy after the last attempt is returned as a
    /// [`StorageError::Fault`], so callers never see `Busy`.
    pub async fn exec_with_retry<F, T>(
        &self,
        policy: &RetryPolicy<Error>,
        label: &str,
        job: F,
    ) -> Result<T>
    where
        F: Fn(&mut SqliteConnection) -> Result<T> + Send + Sync + 'static,
        T: Send + 'static + Any,
    {
        let job = Arc::new(job);
        let (result, attempts) = policy
            .execute_counted(label, || {
                let job = Arc::clone(&job);
                self.exec(move |conn| job(conn))
            })
            .await;

        match result {
            Err(Error::Storage(StorageError::Busy(message))) => {
                Err(Error::Storage(StorageError::Fault(format!(
                    "{} still busy after {} attempts: {}",
                    label, attempts, message
                ))))
            }
            other => other,
        }
    }
}

/// Spawns a background Tokio task that acts as a single writer to the database.
/// This actor owns one database connection from the pool and processes write jobs serially.
pub fn spawn_writer(pool: DbPool) -> WriteHandle {
    // The channel is bounded; 1024 is an arbitrary size.
    let (tx, mut rx) = mpsc::channel::<(ErasedJob, Reply)>(1024);

    tokio::spawn(async move {
        // Acquire a single connection from the pool for this actor.
        // This connection will be held for the lifetime of the actor.
        let mut conn = match pool.get() {
            Ok(conn) => conn,
            Err(e) => {
                error!("Writer actor could not acquire a database connection: {}", e);
                let message = e.to_string();
                while let Some((_, reply_tx)) = rx.recv().await {
                    let _ = reply_tx.send(Err(Error::Storage(StorageError::PoolUnavailable(
                        message.clone(),
                    ))));
                }
                return;
            }
        };

        while let Some((job, reply_tx)) = rx.recv().await {
            let result: Result<Box<dyn Any + Send + 'static>> = conn
                .immediate_transaction::<_, SqliteStorageError, _>(|c| {
                    job(c).map_err(SqliteStorageError::from)
                })
                .map_err(Error::from);

            // The requester may have gone away (e.g. its task was cancelled).
            let _ = reply_tx.send(result);
        }
        // All handles dropped; the actor terminates.
    });

    WriteHandle { tx }
}
