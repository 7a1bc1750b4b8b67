//! In-memory [`Cluster`] for tests.
//!
//! Pod phases and notebook listings are scripted: each `get_pod` / `exec`
//! call consumes the next scripted value and the last one repeats.

use std::collections::BTreeMap;
use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use error_stack::Report;
use k8s_openapi::api::core::v1::Container;
use k8s_openapi::api::core::v1::Node;
use k8s_openapi::api::core::v1::NodeCondition;
use k8s_openapi::api::core::v1::NodeStatus;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::api::core::v1::PodSpec;
use k8s_openapi::api::core::v1::PodStatus;
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

use crate::k8s::cluster::Cluster;
use crate::k8s::cluster::ClusterResult;
use crate::k8s::types::KubernetesError;

pub(crate) const TEST_GPU_RESOURCE: &str = "amd.com/gpu";

/// Scripted pod phase: `(phase, reason)`
pub(crate) type PhaseStep = (&'static str, Option<&'static str>);

pub(crate) struct FakeCluster {
    nodes: Vec<Node>,
    existing_pods: Vec<Pod>,
    unreachable: bool,
    phases: Mutex<VecDeque<PhaseStep>>,
    listings: Mutex<VecDeque<String>>,
    node_port: Option<i32>,
    reject_services: bool,
    host_ip: Option<String>,
    pub(crate) created_pods: Mutex<Vec<Pod>>,
    pub(crate) created_services: Mutex<Vec<Service>>,
    pub(crate) labels: Mutex<Vec<(String, String, String)>>,
    pub(crate) get_pod_calls: Mutex<u32>,
    pub(crate) exec_calls: Mutex<u32>,
}

impl FakeCluster {
    pub(crate) fn new(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            existing_pods: Vec::new(),
            unreachable: false,
            phases: Mutex::new(VecDeque::from([("Running", None)])),
            listings: Mutex::new(VecDeque::from([String::new()])),
            node_port: Some(31500),
            reject_services: false,
            host_ip: Some("10.0.0.7".to_string()),
            created_pods: Mutex::new(Vec::new()),
            created_services: Mutex::new(Vec::new()),
            labels: Mutex::new(Vec::new()),
            get_pod_calls: Mutex::new(0),
            exec_calls: Mutex::new(0),
        }
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(Vec::new())
        }
    }

    pub(crate) fn with_existing_pods(mut self, pods: Vec<Pod>) -> Self {
        self.existing_pods = pods;
        self
    }

    pub(crate) fn with_phases(self, phases: Vec<PhaseStep>) -> Self {
        *self.phases.lock().unwrap() = phases.into();
        self
    }

    pub(crate) fn with_listings(self, listings: Vec<&str>) -> Self {
        *self.listings.lock().unwrap() = listings.into_iter().map(str::to_string).collect();
        self
    }

    pub(crate) fn with_node_port(mut self, node_port: Option<i32>) -> Self {
        self.node_port = node_port;
        self
    }

    pub(crate) fn rejecting_services(mut self) -> Self {
        self.reject_services = true;
        self
    }

    pub(crate) fn with_host_ip(mut self, host_ip: Option<&str>) -> Self {
        self.host_ip = host_ip.map(str::to_string);
        self
    }

    pub(crate) fn created_pod_count(&self) -> usize {
        self.created_pods.lock().unwrap().len()
    }

    fn next<T: Clone>(queue: &Mutex<VecDeque<T>>) -> T {
        let mut queue = queue.lock().unwrap();
        if queue.len() > 1 {
            queue.pop_front().unwrap()
        } else {
            queue.front().cloned().unwrap()
        }
    }

    fn unavailable<T>(&self) -> ClusterResult<T> {
        Err(Report::new(KubernetesError::ConnectionFailed {
            message: "connection refused".to_string(),
        }))
    }
}

#[async_trait]
impl Cluster for FakeCluster {
    async fn list_nodes(&self) -> ClusterResult<Vec<Node>> {
        if self.unreachable {
            return self.unavailable();
        }
        Ok(self.nodes.clone())
    }

    async fn list_pods(&self) -> ClusterResult<Vec<Pod>> {
        if self.unreachable {
            return self.unavailable();
        }
        let mut pods = self.existing_pods.clone();
        pods.extend(self.created_pods.lock().unwrap().iter().cloned());
        Ok(pods)
    }

    async fn create_pod(&self, pod: &Pod) -> ClusterResult<Pod> {
        self.created_pods.lock().unwrap().push(pod.clone());
        Ok(pod.clone())
    }

    async fn get_pod(&self, name: &str) -> ClusterResult<Pod> {
        *self.get_pod_calls.lock().unwrap() += 1;
        let mut pod = self
            .created_pods
            .lock()
            .unwrap()
            .iter()
            .find(|p| p.metadata.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| {
                Report::new(KubernetesError::PodNotFound {
                    pod_name: name.to_string(),
                    namespace: "default".to_string(),
                })
            })?;
        let (phase, reason) = Self::next(&self.phases);
        pod.status = Some(PodStatus {
            phase: Some(phase.to_string()),
            reason: reason.map(str::to_string),
            host_ip: self.host_ip.clone(),
            ..Default::default()
        });
        Ok(pod)
    }

    async fn label_pod(&self, name: &str, key: &str, value: &str) -> ClusterResult<()> {
        self.labels
            .lock()
            .unwrap()
            .push((name.to_string(), key.to_string(), value.to_string()));
        Ok(())
    }

    async fn create_service(&self, service: &Service) -> ClusterResult<Service> {
        if self.reject_services {
            return Err(Report::new(KubernetesError::RequestFailed {
                message: "provided port is already allocated".to_string(),
            }));
        }
        let mut created = service.clone();
        if let Some(ports) = created.spec.as_mut().and_then(|s| s.ports.as_mut()) {
            for port in ports {
                port.node_port = self.node_port;
            }
        }
        self.created_services.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn exec(&self, _pod_name: &str, _command: &[String]) -> ClusterResult<String> {
        *self.exec_calls.lock().unwrap() += 1;
        Ok(Self::next(&self.listings))
    }
}

/// A node advertising `gpus` units of the test GPU resource.
pub(crate) fn gpu_node(name: &str, gpus: u32) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(NodeStatus {
            allocatable: Some(BTreeMap::from([(
                TEST_GPU_RESOURCE.to_string(),
                Quantity(gpus.to_string()),
            )])),
            conditions: Some(vec![NodeCondition {
                type_: "DiskPressure".to_string(),
                status: "False".to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// A GPU node signalling disk pressure.
pub(crate) fn pressured_node(name: &str, gpus: u32) -> Node {
    let mut node = gpu_node(name, gpus);
    if let Some(status) = node.status.as_mut() {
        status.conditions = Some(vec![NodeCondition {
            type_: "DiskPressure".to_string(),
            status: "True".to_string(),
            ..Default::default()
        }]);
    }
    node
}

/// A pod bound to `node` requesting `gpus` units of the test GPU resource.
pub(crate) fn gpu_pod(name: &str, node: &str, gpus: u32, phase: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            node_name: Some(node.to_string()),
            containers: vec![Container {
                name: "main".to_string(),
                resources: Some(ResourceRequirements {
                    requests: Some(BTreeMap::from([(
                        TEST_GPU_RESOURCE.to_string(),
                        Quantity(gpus.to_string()),
                    )])),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        }),
        status: Some(PodStatus {
            phase: Some(phase.to_string()),
            ..Default::default()
        }),
    }
}
