//! Supervised message-bus consumer.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::external::bus::{BusConsumer, Delivery};
use crate::lifecycle::Shutdown;
use crate::supervisor::Supervisor;

/// Application callback invoked for every delivery.
pub type DeliveryHandler = Arc<dyn Fn(Delivery) + Send + Sync>;

/// Handler that forwards each delivery body into a bounded submission
/// queue. The send happens on its own task so a full queue waits for
/// capacity instead of dropping the payload.
pub fn forward_to_queue(submitter: mpsc::Sender<Vec<u8>>) -> DeliveryHandler {
    Arc::new(move |delivery| {
        let submitter = submitter.clone();
        tokio::spawn(async move {
            if submitter.send(delivery.body).await.is_err() {
                tracing::warn!("submission queue closed, delivery dropped");
            }
        });
    })
}

/// Start a supervised consumer. Each generation opens a fresh delivery
/// stream; a closed stream or failed subscribe ends only that generation.
pub fn spawn_bus_consumer(
    name: &'static str,
    consumer: Arc<dyn BusConsumer>,
    binding_keys: Vec<String>,
    on_delivery: DeliveryHandler,
    backoff: Duration,
    shutdown: &Shutdown,
) -> JoinHandle<()> {
    let supervisor = Supervisor::new(name, backoff);
    let shutdown_rx = shutdown.subscribe();
    tokio::spawn(supervisor.run(shutdown_rx, move || {
        let consumer = Arc::clone(&consumer);
        let binding_keys = binding_keys.clone();
        let on_delivery = Arc::clone(&on_delivery);
        async move {
            consume_generation(name, consumer, binding_keys, on_delivery).await;
        }
    }))
}

async fn consume_generation(
    name: &'static str,
    consumer: Arc<dyn BusConsumer>,
    binding_keys: Vec<String>,
    on_delivery: DeliveryHandler,
) {
    let mut deliveries = match consumer.subscribe(&binding_keys).await {
        Ok(rx) => rx,
        Err(e) => {
            tracing::error!(worker = name, error = %e, "bus subscribe failed");
            return;
        }
    };
    while let Some(delivery) = deliveries.recv().await {
        tracing::debug!(
            worker = name,
            routing_key = %delivery.routing_key,
            bytes = delivery.body.len(),
            "bus delivery"
        );
        on_delivery(delivery);
    }
    tracing::error!(worker = name, "bus receive channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::bus::InMemoryBus;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread")]
    async fn deliveries_reach_the_handler_across_generations() {
        let bus = Arc::new(InMemoryBus::new());
        let shutdown = Shutdown::new();
        let seen = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&seen);
        let handle = spawn_bus_consumer(
            "test-consumer",
            Arc::clone(&bus) as Arc<dyn BusConsumer>,
            vec!["cmd.#".to_string()],
            Arc::new(move |_d| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            Duration::from_millis(10),
            &shutdown,
        );

        let wait_for = |target: usize, seen: Arc<AtomicUsize>| async move {
            tokio::time::timeout(Duration::from_secs(5), async {
                while seen.load(Ordering::SeqCst) < target {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("delivery never arrived");
        };

        // First generation may not have subscribed yet; retry the inject.
        tokio::time::timeout(Duration::from_secs(5), async {
            while seen.load(Ordering::SeqCst) == 0 {
                bus.inject("cmd.reboot", b"one");
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("first delivery never arrived");

        // Kill the stream; the supervisor must re-subscribe.
        bus.close_subscribers();
        tokio::time::timeout(Duration::from_secs(5), async {
            let before = seen.load(Ordering::SeqCst);
            loop {
                bus.inject("cmd.reboot", b"two");
                tokio::time::sleep(Duration::from_millis(10)).await;
                if seen.load(Ordering::SeqCst) > before {
                    break;
                }
            }
        })
        .await
        .expect("consumer never recovered after stream close");

        wait_for(2, Arc::clone(&seen)).await;
        shutdown.trigger();
        let _ = handle.await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_forwarding_waits_out_a_full_queue() {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<Vec<u8>>(1);
        let handler = forward_to_queue(tx);

        // Three deliveries against a capacity-1 queue: the forwarders must
        // wait for capacity, not drop.
        for body in [b"one".to_vec(), b"two".to_vec(), b"three".to_vec()] {
            handler(Delivery {
                routing_key: "cmd.forward".to_string(),
                body,
            });
        }

        let mut received = Vec::new();
        for _ in 0..3 {
            let body = tokio::time::timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("forwarded payload never arrived")
                .expect("queue closed early");
            received.push(body);
        }
        received.sort();
        assert_eq!(
            received,
            vec![b"one".to_vec(), b"three".to_vec(), b"two".to_vec()]
        );
    }
}
