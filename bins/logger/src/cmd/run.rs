use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::Effective;
use crate::error::LoggerError;
use pipeline::{BrokerSession, Dispatcher, PipelineError, RecordQueue, spawn_dispatcher};
use storage_file::{DurableWriter, next_sequence_for};
use transport_mqtt::MqttClient;

pub async fn run(eff: Effective) -> Result<(), LoggerError> {
    tracing::info!(
        broker = %format!("{}:{}", eff.mqtt.host, eff.mqtt.port),
        client_id = %eff.mqtt.client_id,
        qos = ?eff.mqtt.qos,
        "mqtt-logger starting"
    );

    // --- Log directory and first sequence number ---
    let dir = eff.naming.dir.clone();
    let log_dir_err = |source| LoggerError::LogDir { path: dir.display().to_string(), source };
    std::fs::create_dir_all(&dir).map_err(log_dir_err)?;
    let sequence = next_sequence_for(&eff.naming).map_err(log_dir_err)?;

    let writer =
        DurableWriter::new(eff.naming.clone(), sequence, eff.rotation, eff.write_retry_delay);
    println!("Starting MQTT logger - saving to {}", writer.current_path().display());
    println!("Press Ctrl+C to stop");

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();
    let signal = {
        let token = token.clone();
        tokio::spawn(async move {
            let result = tokio::signal::ctrl_c().await;
            token.cancel();
            result
        })
    };

    // --- Queue + dispatcher (blocking thread) ---
    let queue = Arc::new(RecordQueue::new(eff.queue_capacity));
    let dispatcher = Dispatcher::new(
        queue.clone(),
        writer,
        Box::new(std::io::stdout()),
        eff.decoding,
    );
    let dispatch = spawn_dispatcher(dispatcher);

    // --- Broker session ---
    let client = MqttClient::new(&eff.mqtt);
    let mut session = BrokerSession::new(Box::new(client), eff.session);
    let outcome = session.run(&queue, token.clone()).await;

    if token.is_cancelled() {
        println!("Stopping MQTT logger...");
    }

    // Queue is closed by now; wait for the dispatcher to drain it.
    let drained = dispatch
        .await
        .map_err(|e| PipelineError::Dispatch(e.to_string()));
    session.disconnect().await;

    let signal_result = if signal.is_finished() {
        signal.await.ok()
    } else {
        signal.abort();
        None
    };

    let drained = drained?;
    let session_summary = outcome?;
    tracing::info!(
        received = session_summary.received,
        connects = session_summary.connects,
        dropped = session_summary.dropped,
        written = drained.written,
        failed = drained.failed,
        "mqtt-logger stopped"
    );

    if let Some(Err(e)) = signal_result {
        return Err(LoggerError::Signal(e));
    }
    Ok(())
}
