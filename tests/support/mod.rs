//! In-process test cluster: every node on 127.0.0.1 with a random port

#![allow(dead_code)]

use rand::{distributions::Alphanumeric, Rng};
use replikv::common::Storage;
use replikv::{Coordinator, Node, NodeConfig};
use reqwest::{Method, RequestBuilder};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tempfile::TempDir;

pub struct TestNode {
    pub url: String,
    pub addr: SocketAddr,
    pub storage: Storage,
    pub coordinator: Arc<Coordinator>,
    /// Set for clusters started with [`TestCluster::start_on_disk`]
    pub data_dir: Option<PathBuf>,
    config: NodeConfig,
    running: Option<Running>,
}

type Running = (oneshot::Sender<()>, JoinHandle<replikv::Result<()>>);

fn spawn_node(
    config: NodeConfig,
    storage: Storage,
    listener: TcpListener,
) -> (Arc<Coordinator>, Running) {
    let node = Node::from_parts(config, storage, listener).unwrap();
    let coordinator = node.coordinator();
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(node.serve(async move {
        let _ = rx.await;
    }));
    (coordinator, (tx, handle))
}

impl TestNode {
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

pub struct TestCluster {
    pub nodes: Vec<TestNode>,
    http: reqwest::Client,
    _data: Option<TempDir>,
}

impl TestCluster {
    /// In-memory storage on every node
    pub async fn start(n: usize) -> Self {
        Self::launch(n, None).await
    }

    /// File storage on every node, one directory each under a temp dir
    pub async fn start_on_disk(n: usize) -> Self {
        Self::launch(n, Some(TempDir::new().unwrap())).await
    }

    async fn launch(n: usize, data: Option<TempDir>) -> Self {
        let mut listeners = Vec::with_capacity(n);
        for _ in 0..n {
            listeners.push(TcpListener::bind("127.0.0.1:0").await.unwrap());
        }
        let addrs: Vec<SocketAddr> = listeners.iter().map(|l| l.local_addr().unwrap()).collect();
        let topology: Vec<String> = addrs.iter().map(|a| format!("http://{}", a)).collect();

        let mut nodes = Vec::with_capacity(n);
        for (listener, addr) in listeners.into_iter().zip(addrs) {
            let url = format!("http://{}", addr);
            let data_dir = data
                .as_ref()
                .map(|d| d.path().join(format!("node-{}", addr.port())));
            let config = NodeConfig {
                bind_addr: addr,
                advertise: url.clone(),
                topology: topology.clone(),
                data_dir: data_dir.clone(),
                replica_timeout_ms: 1_000,
                request_timeout_ms: 3_000,
                ..Default::default()
            };
            let storage = match &data_dir {
                Some(dir) => Storage::open_dir(dir).unwrap(),
                None => Storage::new_memory(),
            };
            let (coordinator, running) = spawn_node(config.clone(), storage.clone(), listener);
            let node = TestNode {
                url,
                addr,
                storage,
                coordinator,
                data_dir,
                config,
                running: Some(running),
            };
            nodes.push(node);
        }

        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            nodes,
            http,
            _data: data,
        }
    }

    /// Stop node `i` and wait until its port is closed
    pub async fn stop(&mut self, i: usize) {
        if let Some((tx, handle)) = self.nodes[i].running.take() {
            let _ = tx.send(());
            let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        }
    }

    /// Bring node `i` back on the same address with the same data.
    ///
    /// On-disk nodes reopen their directory, in-memory nodes keep their map.
    pub async fn restart(&mut self, i: usize) {
        assert!(!self.nodes[i].is_running(), "node {} is still running", i);
        let addr = self.nodes[i].addr;
        let listener = TcpListener::bind(addr).await.unwrap();
        let node = &mut self.nodes[i];
        if let Some(dir) = &node.data_dir {
            node.storage = Storage::open_dir(dir).unwrap();
        }
        let (coordinator, running) =
            spawn_node(node.config.clone(), node.storage.clone(), listener);
        node.coordinator = coordinator;
        node.running = Some(running);
    }

    pub async fn shutdown(mut self) {
        for i in 0..self.nodes.len() {
            self.stop(i).await;
        }
    }

    pub fn entity_url(&self, i: usize) -> String {
        format!("{}/v0/entity", self.nodes[i].url)
    }

    /// Request to `/v0/entity` on node `i`; the key is URL-encoded
    pub fn entity(
        &self,
        method: Method,
        i: usize,
        key: &str,
        ack: usize,
        from: usize,
    ) -> RequestBuilder {
        let replicas = format!("{}/{}", ack, from);
        self.http
            .request(method, self.entity_url(i))
            .query(&[("id", key), ("replicas", replicas.as_str())])
    }

    pub async fn get(&self, i: usize, key: &str, ack: usize, from: usize) -> reqwest::Response {
        self.entity(Method::GET, i, key, ack, from)
            .send()
            .await
            .unwrap()
    }

    pub async fn put(
        &self,
        i: usize,
        key: &str,
        value: &[u8],
        ack: usize,
        from: usize,
    ) -> reqwest::Response {
        self.entity(Method::PUT, i, key, ack, from)
            .body(value.to_vec())
            .send()
            .await
            .unwrap()
    }

    pub async fn delete(&self, i: usize, key: &str, ack: usize, from: usize) -> reqwest::Response {
        self.entity(Method::DELETE, i, key, ack, from)
            .send()
            .await
            .unwrap()
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// How many nodes hold a local copy of `key`
    pub fn copies(&self, key: &str) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.storage.get(key).is_ok())
            .count()
    }

    /// Index of the node whose URL is `url`
    pub fn index_of(&self, url: &str) -> usize {
        self.nodes.iter().position(|n| n.url == url).unwrap()
    }
}

pub fn random_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(16)
        .map(char::from)
        .collect()
}

pub fn random_value() -> Vec<u8> {
    let mut value = vec![0u8; 256];
    rand::thread_rng().fill(&mut value[..]);
    value
}
