//! Channel fan-in
//!
//! Merges several bounded channels into one. Each input is drained by its
//! own forwarding task; the output closes once every input closed. Event
//! order is preserved per input, interleaving across inputs is arbitrary.

use tokio::sync::mpsc;

/// Merges the given receivers into a single bounded channel
pub fn merge<T: Send + 'static>(inputs: Vec<mpsc::Receiver<T>>) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(1);
    for mut input in inputs {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(item) = input.recv().await {
                if tx.send(item).await.is_err() {
                    break;
                }
            }
        });
    }
    rx
}
