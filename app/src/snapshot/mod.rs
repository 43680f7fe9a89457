use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context as _;
use futures::StreamExt as _;
use infrastructure::{EventListener, HttpClientConfig};
use reqwest_middleware::ClientWithMiddleware;
use tokio::io::AsyncWriteExt as _;

use crate::device::{DeviceEvent, DeviceId};

pub fn snapshot_file(cache_dir: &Path, device: &DeviceId) -> PathBuf {
    cache_dir.join(format!("{}.jpg", device))
}

#[derive(Debug, Clone)]
pub struct SnapshotFetcher {
    client: ClientWithMiddleware,
    cache_dir: PathBuf,
}

impl SnapshotFetcher {
    pub fn new(cache_dir: PathBuf, timeout: Duration) -> anyhow::Result<Self> {
        let client = HttpClientConfig::new(None).with_timeout(timeout).new_tracing_client()?;
        Ok(Self { client, cache_dir })
    }

    pub async fn run(self, mut events: EventListener<DeviceEvent>) {
        if let Err(e) = tokio::fs::create_dir_all(&self.cache_dir).await {
            tracing::error!("Error creating snapshot cache directory {:?}: {:?}", self.cache_dir, e);
        }

        //One task per download, a slow station never delays the others
        while let Some(event) = events.recv().await {
            let fetcher = self.clone();
            tokio::spawn(async move {
                let device = event.id();
                if let Err(e) = fetcher.fetch(device, event.image_url()).await {
                    tracing::error!("Error fetching snapshot of device {}: {:?}", device, e);
                }
            });
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, device: &DeviceId, url: &str) -> anyhow::Result<PathBuf> {
        let target = snapshot_file(&self.cache_dir, device);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            anyhow::bail!("Snapshot download responded with status {}", status);
        }

        //Every download gets its own temp file, concurrent fetches of a device never share one.
        //Dropping it on error removes the partial file.
        let partial = tempfile::Builder::new()
            .prefix(&format!("{}.", device))
            .suffix(".jpg.part")
            .tempfile_in(&self.cache_dir)
            .with_context(|| format!("Error creating temp file in {:?}", self.cache_dir))?;

        let mut file = tokio::fs::File::from_std(partial.reopen()?);
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;
        drop(file);

        partial
            .persist(&target)
            .with_context(|| format!("Error replacing snapshot {:?}", target))?;

        tracing::debug!("Stored snapshot of device {} in {:?}", device, target);
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{HttpResponse, web};

    use super::*;
    use crate::core::test_support;

    const LARGE_IMAGE: usize = 1 << 20;

    fn cached_files(dir: &Path) -> Vec<PathBuf> {
        std::fs::read_dir(dir).unwrap().map(|e| e.unwrap().path()).collect()
    }

    fn image_server() -> String {
        test_support::serve(|| {
            web::scope("/img")
                .route(
                    "/a.jpg",
                    web::get().to(|| async { HttpResponse::Ok().content_type("image/jpeg").body("new image") }),
                )
                .route("/missing.jpg", web::get().to(|| async { HttpResponse::NotFound().finish() }))
                .route(
                    "/large.jpg",
                    web::get().to(|| async { HttpResponse::Ok().content_type("image/jpeg").body(vec![7u8; LARGE_IMAGE]) }),
                )
        })
    }

    fn fetcher(dir: &Path) -> SnapshotFetcher {
        SnapshotFetcher::new(dir.to_path_buf(), Duration::from_secs(5)).unwrap()
    }

    #[actix_web::test]
    async fn test_snapshot_is_written_to_device_file() {
        let base = image_server();
        let dir = tempfile::tempdir().unwrap();
        let device = DeviceId::from_station_id("A");

        let path = fetcher(dir.path()).fetch(&device, &format!("{}/img/a.jpg", base)).await.unwrap();

        assert_eq!(path, dir.path().join(format!("{}.jpg", device)));
        assert_eq!(std::fs::read(&path).unwrap(), b"new image");
        assert_eq!(cached_files(dir.path()), vec![path]);
    }

    #[actix_web::test]
    async fn test_snapshot_replaces_previous_image() {
        let base = image_server();
        let dir = tempfile::tempdir().unwrap();
        let device = DeviceId::from_station_id("A");
        std::fs::write(snapshot_file(dir.path(), &device), b"old image").unwrap();

        fetcher(dir.path()).fetch(&device, &format!("{}/img/a.jpg", base)).await.unwrap();

        assert_eq!(std::fs::read(snapshot_file(dir.path(), &device)).unwrap(), b"new image");
    }

    #[actix_web::test]
    async fn test_failed_download_keeps_previous_image() {
        let base = image_server();
        let dir = tempfile::tempdir().unwrap();
        let device = DeviceId::from_station_id("A");
        std::fs::write(snapshot_file(dir.path(), &device), b"old image").unwrap();

        let res = fetcher(dir.path())
            .fetch(&device, &format!("{}/img/missing.jpg", base))
            .await;

        assert!(res.is_err());
        assert_eq!(std::fs::read(snapshot_file(dir.path(), &device)).unwrap(), b"old image");
        assert_eq!(cached_files(dir.path()).len(), 1);
    }

    #[actix_web::test]
    async fn test_concurrent_fetches_of_one_device_both_succeed() {
        let base = image_server();
        let dir = tempfile::tempdir().unwrap();
        let device = DeviceId::from_station_id("A");
        let fetcher = fetcher(dir.path());
        let url = format!("{}/img/large.jpg", base);

        for _ in 0..5 {
            let (first, second) = tokio::join!(fetcher.fetch(&device, &url), fetcher.fetch(&device, &url));

            assert!(first.is_ok());
            assert!(second.is_ok());
            assert_eq!(std::fs::read(snapshot_file(dir.path(), &device)).unwrap().len(), LARGE_IMAGE);
            assert_eq!(cached_files(dir.path()).len(), 1);
        }
    }

    #[actix_web::test]
    async fn test_unreachable_host_is_an_error() {
        let dir = tempfile::tempdir().unwrap();

        let res = fetcher(dir.path())
            .fetch(&DeviceId::from_station_id("A"), "http://127.0.0.1:9/a.jpg")
            .await;

        assert!(res.is_err());
    }

    #[actix_web::test]
    async fn test_run_fetches_on_device_events() {
        let base = image_server();
        let dir = tempfile::tempdir().unwrap();
        let cache = dir.path().join("cache");
        let bus = infrastructure::EventBus::new(8);
        let device = DeviceId::from_station_id("A");

        let runner = actix_web::rt::spawn(fetcher(&cache).run(bus.subscribe()));
        bus.emitter().send(DeviceEvent::Created {
            id: device,
            image_url: format!("{}/img/a.jpg", base),
        });

        let target = snapshot_file(&cache, &device);
        tokio::time::timeout(Duration::from_secs(5), async {
            while !target.exists() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();

        runner.abort();
    }
}
