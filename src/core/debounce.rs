//! Coalesces bursts of values into a single delayed action.

use std::future::Future;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc;
use tokio::time::sleep;

/// Runs `action` with the latest pushed value once no new value has arrived for `window`.
/// Every push restarts the window. A value still pending when the debouncer is dropped is flushed.
pub struct Debouncer<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T: Send + 'static> Debouncer<T> {
    pub fn new<F, Fut>(window: Duration, action: F) -> Self
    where
        F: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<T>();
        tokio::spawn(async move {
            while let Some(mut pending) = rx.recv().await {
                loop {
                    tokio::select! {
                        next = rx.recv() => match next {
                            Some(value) => pending = value,
                            None => {
                                action(pending).await;
                                return;
                            }
                        },
                        _ = sleep(window) => {
                            action(pending).await;
                            break;
                        }
                    }
                }
            }
            debug!("Debouncer stopped");
        });
        Self { tx }
    }

    pub fn push(&self, value: T) {
        if self.tx.send(value).is_err() {
            debug!("Debouncer task gone, value dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<u32>>>, Debouncer<u32>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let debouncer = Debouncer::new(Duration::from_millis(40), move |value| {
            let sink = sink.clone();
            async move { sink.lock().unwrap().push(value) }
        });
        (seen, debouncer)
    }

    #[tokio::test]
    async fn burst_fires_once_with_latest_value() {
        let (seen, debouncer) = recorder();
        for value in 1..=5 {
            debouncer.push(value);
            sleep(Duration::from_millis(5)).await;
        }
        sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock().unwrap(), vec![5]);

        debouncer.push(9);
        sleep(Duration::from_millis(150)).await;
        assert_eq!(*seen.lock().unwrap(), vec![5, 9]);
    }

    #[tokio::test]
    async fn pending_value_is_flushed_on_drop() {
        let (seen, debouncer) = recorder();
        debouncer.push(3);
        drop(debouncer);
        sleep(Duration::from_millis(20)).await;
        assert_eq!(*seen.lock().unwrap(), vec![3]);
    }
}
