use crate::error::ExportError;
use cogtask_experiment::{DataSink, RunData};
use std::sync::mpsc::{self, Sender};
use std::thread::{self, JoinHandle};
use tracing::{debug, error};

enum Job {
    Save(Box<RunData>),
    Code { experiment: String, code: String },
}

/// Runs another sink on a worker thread so slow uploads never block the
/// frame loop. Jobs run in the order they were queued; dropping the sink
/// waits for the queue to drain.
pub struct BackgroundSink<S: DataSink + Send + 'static> {
    tx: Option<Sender<Job>>,
    worker: Option<JoinHandle<S>>,
}

impl<S: DataSink + Send + 'static> BackgroundSink<S> {
    pub fn spawn(mut sink: S) -> Result<Self, ExportError> {
        let (tx, rx) = mpsc::channel::<Job>();
        let worker = thread::Builder::new()
            .name("cogtask-save".into())
            .spawn(move || {
                for job in rx {
                    match job {
                        Job::Save(data) => sink.save(&data),
                        Job::Code { experiment, code } => sink.submit_code(&experiment, &code),
                    }
                }
                sink
            })
            .map_err(ExportError::Worker)?;
        Ok(Self {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    fn send(&self, job: Job) {
        let Some(tx) = &self.tx else {
            return;
        };
        if tx.send(job).is_err() {
            error!("save worker is gone, data not saved");
        }
    }

    /// Waits for queued jobs and hands the inner sink back.
    pub fn finish(mut self) -> Option<S> {
        self.join()
    }

    fn join(&mut self) -> Option<S> {
        drop(self.tx.take());
        let worker = self.worker.take()?;
        debug!("waiting for pending saves");
        match worker.join() {
            Ok(sink) => Some(sink),
            Err(_) => {
                error!("save worker panicked");
                None
            }
        }
    }
}

impl<S: DataSink + Send + 'static> DataSink for BackgroundSink<S> {
    fn save(&mut self, data: &RunData) {
        self.send(Job::Save(Box::new(data.clone())));
    }

    fn submit_code(&mut self, experiment_name: &str, code: &str) {
        self.send(Job::Code {
            experiment: experiment_name.to_string(),
            code: code.to_string(),
        });
    }
}

impl<S: DataSink + Send + 'static> Drop for BackgroundSink<S> {
    fn drop(&mut self) {
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::row::tests::run_data;
    use cogtask_experiment::{MemorySink, OutputFormat};
    use std::sync::{Arc, Barrier};

    #[test]
    fn jobs_reach_the_inner_sink_in_order() {
        let mut sink = BackgroundSink::spawn(MemorySink::default()).unwrap();
        sink.save(&run_data(OutputFormat::Csv));
        sink.submit_code("flanker", "Ab12");
        let inner = sink.finish().unwrap();
        assert_eq!(inner.saves(), 1);
        assert_eq!(inner.codes, vec![("flanker".to_string(), "Ab12".to_string())]);
    }

    /// Blocks inside `save` until the test releases it.
    struct Gate(Arc<Barrier>, Arc<Barrier>);

    impl DataSink for Gate {
        fn save(&mut self, _data: &RunData) {
            self.0.wait();
            self.1.wait();
        }
    }

    #[test]
    fn save_returns_while_the_worker_is_busy() {
        let entered = Arc::new(Barrier::new(2));
        let release = Arc::new(Barrier::new(2));
        let mut sink =
            BackgroundSink::spawn(Gate(Arc::clone(&entered), Arc::clone(&release))).unwrap();

        sink.save(&run_data(OutputFormat::Csv));
        // The worker is now stuck inside the inner save, yet this thread
        // carries on.
        entered.wait();
        release.wait();
        assert!(sink.finish().is_some());
    }
}
