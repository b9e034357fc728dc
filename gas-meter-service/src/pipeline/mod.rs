use std::{pin::Pin, sync::Arc, time::SystemTime};

use futures::{Stream, StreamExt};

#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub payload: T,
    pub received_at: SystemTime,
    /// Where the payload entered the service (`http`, `ndjson`, `csv`).
    pub origin: &'static str,
}

impl<T> Envelope<T> {
    pub fn new(payload: T, origin: &'static str) -> Self {
        Self {
            payload,
            received_at: SystemTime::now(),
            origin,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
}

pub type EnvelopeStream<T> = Pin<Box<dyn Stream<Item = Result<Envelope<T>, PipelineError>> + Send>>;

#[async_trait::async_trait]
pub trait Source<T>: Send + Sync {
    async fn stream(&self) -> EnvelopeStream<T>;
}

#[async_trait::async_trait]
pub trait Transform<I, O>: Send + Sync {
    async fn apply(&self, input: Envelope<I>) -> Result<Envelope<O>, PipelineError>;
}

#[async_trait::async_trait]
pub trait Sink<T>: Send + Sync {
    async fn run<S>(&self, input: S) -> Result<(), PipelineError>
    where
        S: Stream<Item = Result<Envelope<T>, PipelineError>> + Send + Unpin + 'static;
}

/// Source, same-type transform chain and sink, run until the source ends.
pub struct Pipeline<S, T, K> {
    pub name: String,
    pub source: S,
    pub transforms: Vec<Arc<dyn Transform<T, T> + Send + Sync>>,
    pub sink: K,
}

impl<T, S, K> Pipeline<S, T, K>
where
    T: Send + 'static,
    S: Source<T> + Send + Sync + 'static,
    K: Sink<T> + Send + Sync + 'static,
{
    pub async fn run(self) -> Result<(), PipelineError> {
        tracing::info!(pipeline = %self.name, transforms = self.transforms.len(), "pipeline started");
        let mut stream = self.source.stream().await;

        for t in self.transforms {
            stream = Box::pin(stream.then(move |item| {
                let t = t.clone();
                async move {
                    match item {
                        Ok(env) => t.apply(env).await,
                        Err(e) => Err(e),
                    }
                }
            }));
        }

        let res = self.sink.run(stream).await;
        match &res {
            Ok(()) => tracing::info!(pipeline = %self.name, "pipeline finished"),
            Err(e) => tracing::error!(pipeline = %self.name, error = %e, "pipeline failed"),
        }
        res
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{command::ReadingCommand, transform::ReadingCommandValidation};
    use std::sync::Mutex;

    struct VecSource(Mutex<Vec<ReadingCommand>>);

    #[async_trait::async_trait]
    impl Source<ReadingCommand> for VecSource {
        async fn stream(&self) -> EnvelopeStream<ReadingCommand> {
            let items: Vec<_> = std::mem::take(&mut *self.0.lock().unwrap())
                .into_iter()
                .map(|c| Ok(Envelope::new(c, "test")))
                .collect();
            Box::pin(futures::stream::iter(items))
        }
    }

    #[derive(Default)]
    struct CollectSink {
        accepted: Mutex<Vec<String>>,
        rejected: Mutex<usize>,
    }

    #[async_trait::async_trait]
    impl Sink<ReadingCommand> for Arc<CollectSink> {
        async fn run<S>(&self, mut input: S) -> Result<(), PipelineError>
        where
            S: Stream<Item = Result<Envelope<ReadingCommand>, PipelineError>> + Send + Unpin + 'static,
        {
            while let Some(item) = input.next().await {
                match item {
                    Ok(env) => {
                        if let ReadingCommand::Apply { datetime, .. } = env.payload {
                            self.accepted.lock().unwrap().push(datetime);
                        }
                    }
                    Err(_) => *self.rejected.lock().unwrap() += 1,
                }
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn transforms_run_between_source_and_sink() {
        let sink = Arc::new(CollectSink::default());
        let pipeline: Pipeline<_, ReadingCommand, _> = Pipeline {
            name: "test".to_string(),
            source: VecSource(Mutex::new(vec![
                ReadingCommand::apply(" 2025-01-12 10:00 ", "100"),
                ReadingCommand::apply("2025-01-12 10:30", ""),
                ReadingCommand::apply("2025-01-12 11:00", "106"),
            ])),
            transforms: vec![Arc::new(ReadingCommandValidation)],
            sink: sink.clone(),
        };

        pipeline.run().await.unwrap();

        assert_eq!(
            *sink.accepted.lock().unwrap(),
            vec!["2025-01-12 10:00".to_string(), "2025-01-12 11:00".to_string()]
        );
        assert_eq!(*sink.rejected.lock().unwrap(), 1);
    }
}
