use std::time::Duration;

use infrastructure::meter;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::adapter::bloomsky::{BloomskyClient, StationApiError};

use super::Station;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Forwarded(usize),
    Rejected,
    Failed,
}

pub struct StationPoller {
    client: Option<BloomskyClient>,
    interval: Duration,
    stations_tx: mpsc::Sender<Vec<Station>>,
}

impl StationPoller {
    pub fn new(client: Option<BloomskyClient>, interval: Duration, stations_tx: mpsc::Sender<Vec<Station>>) -> Self {
        Self {
            client,
            interval,
            stations_tx,
        }
    }

    pub async fn run(self) {
        let Some(client) = &self.client else {
            tracing::info!("No station API key configured, station polling is disabled");
            return std::future::pending().await;
        };

        tracing::info!("Polling station API every {:?}", self.interval);

        //Ticks are handled one after the other, a slow poll delays the next one
        let mut timer = tokio::time::interval(self.interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            timer.tick().await;
            self.poll_once(client).await;
        }
    }

    async fn poll_once(&self, client: &BloomskyClient) -> PollOutcome {
        let outcome = match client.get_stations().await {
            Ok(stations) => {
                let count = stations.len();
                tracing::debug!("Received {} stations", count);

                if let Err(e) = self.stations_tx.send(stations).await {
                    tracing::error!("Error forwarding station list: {:?}", e);
                    PollOutcome::Failed
                } else {
                    PollOutcome::Forwarded(count)
                }
            }
            Err(e @ StationApiError::Rejected { .. }) => {
                tracing::error!("Skipping station update: {}", e);
                PollOutcome::Rejected
            }
            Err(e) => {
                tracing::error!("Skipping station update: {} -- {:?}", e, e);
                PollOutcome::Failed
            }
        };

        let result = match outcome {
            PollOutcome::Forwarded(_) => "ok",
            PollOutcome::Rejected => "rejected",
            PollOutcome::Failed => "failed",
        };
        meter::increment("station_poll", &[("result", result)]);

        outcome
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use actix_web::{HttpResponse, web};

    use super::*;
    use crate::core::test_support;

    fn poller(base: &str) -> (StationPoller, mpsc::Receiver<Vec<Station>>) {
        let client =
            BloomskyClient::new(&format!("{}/api/skydata/", base), "intl", "key", Duration::from_secs(5)).unwrap();
        let (tx, rx) = mpsc::channel(4);
        (StationPoller::new(Some(client), Duration::from_millis(50), tx), rx)
    }

    fn station_list() -> serde_json::Value {
        serde_json::to_value(vec![crate::station::fixture::station("A", "SKY1", 2600.0)]).unwrap()
    }

    #[actix_web::test]
    async fn test_station_list_is_forwarded() {
        let base = test_support::serve(|| {
            web::scope("/api").route(
                "/skydata/",
                web::get().to(|| async { HttpResponse::Ok().json(station_list()) }),
            )
        });
        let (poller, mut rx) = poller(&base);

        let outcome = poller.poll_once(poller.client.as_ref().unwrap()).await;

        assert_eq!(outcome, PollOutcome::Forwarded(1));
        assert_eq!(rx.recv().await.unwrap()[0].device_id, "A");
    }

    #[actix_web::test]
    async fn test_empty_list_is_forwarded() {
        let base = test_support::serve(|| {
            web::scope("/api").route(
                "/skydata/",
                web::get().to(|| async { HttpResponse::Ok().json(serde_json::json!([])) }),
            )
        });
        let (poller, mut rx) = poller(&base);

        let outcome = poller.poll_once(poller.client.as_ref().unwrap()).await;

        assert_eq!(outcome, PollOutcome::Forwarded(0));
        assert!(rx.recv().await.unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_rejected_poll_forwards_nothing_and_keeps_ticking() {
        let hits = Arc::new(AtomicUsize::new(0));
        let server_hits = hits.clone();
        let base = test_support::serve(move || {
            let hits = server_hits.clone();
            web::scope("/api").route(
                "/skydata/",
                web::get().to(move || {
                    let hits = hits.clone();
                    async move {
                        hits.fetch_add(1, Ordering::SeqCst);
                        HttpResponse::Ok().json(serde_json::json!({"detail": "invalid key"}))
                    }
                }),
            )
        });
        let (poller, mut rx) = poller(&base);

        assert_eq!(
            poller.poll_once(poller.client.as_ref().unwrap()).await,
            PollOutcome::Rejected
        );

        let _ = tokio::time::timeout(Duration::from_millis(300), poller.run()).await;

        assert!(hits.load(Ordering::SeqCst) >= 3);
        assert!(rx.try_recv().is_err());
    }

    #[actix_web::test]
    async fn test_transport_failure_is_skipped() {
        let (poller, mut rx) = poller("http://127.0.0.1:9");

        let outcome = poller.poll_once(poller.client.as_ref().unwrap()).await;

        assert_eq!(outcome, PollOutcome::Failed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_poller_without_client_idles() {
        let (tx, mut rx) = mpsc::channel(1);
        let poller = StationPoller::new(None, Duration::from_millis(10), tx);

        let res = tokio::time::timeout(Duration::from_millis(100), poller.run()).await;

        assert!(res.is_err());
        assert!(rx.try_recv().is_err());
    }
}
