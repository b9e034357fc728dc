use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use gas_meter_core::{GasMeter, HistorySource, LogStore, MeterError};

use crate::{
    command::{respond, ReadingCommand},
    pipeline::{Envelope, PipelineError, Sink},
    state_board::StateBoard,
};

/// Executes reading commands against one meter, strictly in arrival order.
///
/// This is the only writer of the reading log: each command finishes before
/// the next is taken from the stream.
pub struct GasMeterSink<H, S> {
    meter: GasMeter<H, S>,
    board: StateBoard,
    applied: AtomicU64,
    failed: AtomicU64,
}

impl<H, S> GasMeterSink<H, S>
where
    H: HistorySource,
    S: LogStore,
{
    pub fn new(meter: GasMeter<H, S>, board: StateBoard) -> Self {
        Self {
            meter,
            board,
            applied: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Readings applied since this sink was created.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Commands that failed since this sink was created.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    async fn execute(&self, env: Envelope<ReadingCommand>) {
        let origin = env.origin;
        match env.payload {
            ReadingCommand::Apply {
                datetime,
                consumed_gas,
                reply,
            } => {
                tracing::debug!(%datetime, %consumed_gas, origin, "trigger gas update");
                let res = self.meter.apply_reading(&datetime, &consumed_gas).await;
                let res = match res {
                    Ok(update) => {
                        self.board.publish(&update).await;
                        self.applied.fetch_add(1, Ordering::Relaxed);
                        metrics::counter!("gas_meter_readings_applied_total", "origin" => origin).increment(1);
                        metrics::gauge!("gas_meter_latest_gas_data").set(update.latest_value());
                        if let Some(rate) = update.average_rate() {
                            metrics::gauge!("gas_meter_average_m3_per_min").set(rate);
                        }
                        Ok(update.reading)
                    }
                    Err(e) => {
                        self.record_failure("apply", &e);
                        Err(e)
                    }
                };
                respond(reply, res);
            }
            ReadingCommand::ReadLog { reply } => {
                let res = self.meter.read_log().await;
                match &res {
                    Ok(log) => {
                        for record in log {
                            tracing::info!(record = ?record, "gas record");
                        }
                    }
                    Err(e) => self.record_failure("read_log", e),
                }
                respond(reply, res);
            }
            ReadingCommand::Estimate { at, reply } => {
                let res = self.meter.estimate(at).await;
                match &res {
                    Ok(Some(estimate)) => self.board.publish_estimate(estimate).await,
                    Ok(None) => {}
                    Err(e) => self.record_failure("estimate", e),
                }
                respond(reply, res);
            }
        }
    }

    fn record_failure(&self, command: &'static str, e: &MeterError) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("gas_meter_update_failures_total", "command" => command, "kind" => e.kind()).increment(1);
        tracing::error!(error = %e, command, "gas meter command failed");
    }
}

#[async_trait::async_trait]
impl<H, S> Sink<ReadingCommand> for GasMeterSink<H, S>
where
    H: HistorySource,
    S: LogStore,
{
    async fn run<St>(&self, mut input: St) -> Result<(), PipelineError>
    where
        St: futures::Stream<Item = Result<Envelope<ReadingCommand>, PipelineError>> + Send + Unpin + 'static,
    {
        while let Some(item) = input.next().await {
            match item {
                Ok(env) => self.execute(env).await,
                Err(e) => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(error = %e, "dropping command rejected upstream of gas meter sink");
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFileStore;
    use gas_meter_core::meter::InMemoryHistory;
    use time::macros::datetime;
    use tokio::sync::oneshot;

    const BOILER: &str = "switch.kociol_l1";

    fn scratch_file() -> std::path::PathBuf {
        use std::sync::atomic::AtomicUsize;
        static NEXT: AtomicUsize = AtomicUsize::new(0);
        let n = NEXT.fetch_add(1, Ordering::SeqCst);
        std::env::temp_dir().join(format!("gas-meter-sink-{}-{n}.json", std::process::id()))
    }

    fn history() -> InMemoryHistory {
        let mut h = InMemoryHistory::new();
        h.push(BOILER, datetime!(2025-01-12 09:00:00 UTC), "off");
        h.push(BOILER, datetime!(2025-01-12 10:15:00 UTC), "on");
        h.push(BOILER, datetime!(2025-01-12 10:45:00 UTC), "off");
        h
    }

    fn sink() -> GasMeterSink<InMemoryHistory, JsonFileStore> {
        let meter = GasMeter::new(history(), JsonFileStore::new(scratch_file()), BOILER);
        GasMeterSink::new(meter, StateBoard::new())
    }

    fn apply(datetime: &str, value: &str) -> (Envelope<ReadingCommand>, oneshot::Receiver<Result<gas_meter_core::domain::Reading, MeterError>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = ReadingCommand::Apply {
            datetime: datetime.to_string(),
            consumed_gas: value.to_string(),
            reply: Some(tx),
        };
        (Envelope::new(cmd, "http"), rx)
    }

    #[tokio::test]
    async fn applies_readings_in_order_and_publishes() {
        let sink = sink();
        let (a, rx_a) = apply("2025-01-12 10:00", "100.0");
        let (b, rx_b) = apply("2025-01-12 10:30", "103.0");
        let (c, rx_c) = apply("2025-01-12 11:00", "106");

        let input = futures::stream::iter(vec![Ok(a), Ok(b), Ok(c)]);
        sink.run(input).await.unwrap();

        assert!(rx_a.await.unwrap().unwrap().derived.is_none());
        let second = rx_b.await.unwrap().unwrap().derived.unwrap();
        assert!((second.interval_rate.unwrap() - 0.2).abs() < 1e-9);
        let third = rx_c.await.unwrap().unwrap().derived.unwrap();
        assert!((third.cumulative_consumed - 6.0).abs() < 1e-9);
        assert!((third.cumulative_active_minutes - 30.0).abs() < 1e-9);
        assert!((third.average_rate.unwrap() - 0.2).abs() < 1e-9);

        let states = sink.board.snapshot().await;
        assert_eq!(states.latest_gas_update, Some(datetime!(2025-01-12 11:00:00 UTC)));
        assert_eq!(states.latest_gas_data, Some(106.0));
        assert!((states.average_m3_per_min.unwrap() - 0.2).abs() < 1e-9);
        assert_eq!(states.readings.len(), 3);
        assert_eq!(sink.applied(), 3);
        assert_eq!(sink.failed(), 0);
    }

    #[tokio::test]
    async fn failed_command_is_answered_and_does_not_stop_the_sink() {
        let sink = sink();
        let (bad, rx_bad) = apply("2025/01/12", "100");
        let (good, rx_good) = apply("2025-01-12 10:00", "100");
        let (log_tx, log_rx) = oneshot::channel();
        let read = Envelope::new(ReadingCommand::ReadLog { reply: Some(log_tx) }, "http");

        let input = futures::stream::iter(vec![
            Ok(bad),
            Err(PipelineError::Transform("consumed_gas must not be blank".to_string())),
            Ok(good),
            Ok(read),
        ]);
        sink.run(input).await.unwrap();

        assert!(matches!(rx_bad.await.unwrap(), Err(MeterError::Parse(_))));
        assert!(rx_good.await.unwrap().is_ok());
        assert_eq!(log_rx.await.unwrap().unwrap().len(), 1);
        assert_eq!(sink.applied(), 1);
        assert_eq!(sink.failed(), 2);
    }

    #[tokio::test]
    async fn estimate_is_published() {
        let sink = sink();
        let (a, _rx) = apply("2025-01-12 10:00", "100");
        let (tx, rx) = oneshot::channel();
        let est = Envelope::new(
            ReadingCommand::Estimate {
                at: datetime!(2025-01-12 10:30:00 UTC),
                reply: Some(tx),
            },
            "http",
        );

        sink.run(futures::stream::iter(vec![Ok(a), Ok(est)])).await.unwrap();

        let estimate = rx.await.unwrap().unwrap().unwrap();
        assert!(estimate.fallback_rate);
        assert!((estimate.active_minutes_since_reading - 15.0).abs() < 1e-9);
        assert_eq!(sink.board.snapshot().await.consumed_gas_estimate, Some(100.0));
    }
}
