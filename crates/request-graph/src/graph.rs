//! The request graph scheduler.
//!
//! Requests are keyed, memoized units of work. Running a request that is
//! already known and not invalidated returns the stored result without
//! re-executing it; concurrent runs of the same id share a single
//! execution; nested runs record parent/child edges for transitive
//! invalidation; and a request that transitively invokes itself fails with
//! a typed cycle error instead of deadlocking.

use crate::invalidation::{FsEvent, Invalidation};
use async_trait::async_trait;
use kiln_core::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// A keyed, memoized unit of work.
///
/// `R` is the result representation shared by every request in a graph;
/// results must be cheap to clone since memoized and deduplicated callers
/// all receive clones.
#[async_trait]
pub trait Request<R>: Send + Sync
where
    R: Clone + Send + Sync + 'static,
{
    /// Stable, content-derived identity of this request.
    fn id(&self) -> String;

    /// Execute the request.
    ///
    /// Invalidation edges and sub-requests go through the provided API;
    /// edges are committed atomically with success and discarded on
    /// failure.
    async fn run(&self, api: &RequestApi<R>) -> Result<R>;
}

/// A request node's stored state.
#[derive(Debug, Clone)]
struct RequestNode<R> {
    result: R,
    invalidations: HashSet<Invalidation>,
    children: HashSet<String>,
    dirty: bool,
}

#[derive(Debug)]
struct GraphState<R> {
    nodes: HashMap<String, RequestNode<R>>,
    inflight: HashMap<String, broadcast::Sender<Result<R>>>,
}

/// The request graph: tracks request nodes, their invalidation edges and
/// their child requests, and executes requests with memoization.
#[derive(Debug)]
pub struct RequestGraph<R> {
    state: Mutex<GraphState<R>>,
}

impl<R> Default for RequestGraph<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> RequestGraph<R> {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(GraphState {
                nodes: HashMap::new(),
                inflight: HashMap::new(),
            }),
        }
    }
}

impl<R> RequestGraph<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Run a top-level request.
    ///
    /// Returns the memoized result when the node is known and not
    /// invalidated; otherwise executes it, records its invalidation edges
    /// and children, and stores the result.
    pub async fn run_request<Q>(self: &Arc<Self>, req: &Q) -> Result<R>
    where
        Q: Request<R> + ?Sized,
    {
        self.run_inner(req, &[]).await
    }

    async fn run_inner<Q>(self: &Arc<Self>, req: &Q, ancestors: &[String]) -> Result<R>
    where
        Q: Request<R> + ?Sized,
    {
        let id = req.id();
        if ancestors.contains(&id) {
            let mut chain = ancestors.to_vec();
            chain.push(id);
            return Err(Error::RequestCycle { chain });
        }

        enum Role<R> {
            Memo(R),
            Wait(broadcast::Receiver<Result<R>>),
            Run(broadcast::Sender<Result<R>>),
        }

        let sender = loop {
            let role = {
                let mut state = self.state.lock().expect("request graph lock");
                let memoized = state
                    .nodes
                    .get(&id)
                    .and_then(|node| (!node.dirty).then(|| node.result.clone()));
                if let Some(result) = memoized {
                    tracing::debug!(request = %id, "Request served from memory");
                    Role::Memo(result)
                } else if let Some(tx) = state.inflight.get(&id) {
                    Role::Wait(tx.subscribe())
                } else {
                    let (tx, _) = broadcast::channel(1);
                    state.inflight.insert(id.clone(), tx.clone());
                    Role::Run(tx)
                }
            };

            match role {
                Role::Memo(result) => return Ok(result),
                Role::Wait(mut rx) => {
                    tracing::debug!(request = %id, "Joining in-flight request");
                    match rx.recv().await {
                        Ok(outcome) => return outcome,
                        // The running task was cancelled before completing;
                        // take over (or re-join) on the next iteration.
                        Err(_) => continue,
                    }
                }
                Role::Run(tx) => break tx,
            }
        };

        // We are the single executor for this id. The guard releases the
        // in-flight marker if this future is dropped mid-run so waiters can
        // retry instead of hanging.
        let mut guard = InflightGuard {
            graph: Arc::clone(self),
            id: id.clone(),
            armed: true,
        };

        let mut chain = ancestors.to_vec();
        chain.push(id.clone());
        let api = RequestApi {
            graph: Arc::clone(self),
            chain,
            buffer: Mutex::new(ApiBuffer::default()),
        };

        tracing::debug!(request = %id, "Executing request");
        let outcome = req.run(&api).await;

        let ApiBuffer {
            invalidations,
            children,
        } = api.into_buffer();

        {
            let mut state = self.state.lock().expect("request graph lock");
            match &outcome {
                Ok(result) => {
                    state.nodes.insert(
                        id.clone(),
                        RequestNode {
                            result: result.clone(),
                            invalidations,
                            children,
                            dirty: false,
                        },
                    );
                }
                Err(e) => {
                    // Unresolved: partial edges are discarded together with
                    // the partial result, and later runs retry.
                    tracing::warn!(request = %id, error = %e, "Request failed");
                    state.nodes.remove(&id);
                }
            }
            state.inflight.remove(&id);
        }
        guard.armed = false;

        let _ = sender.send(outcome.clone());
        outcome
    }

    /// Consume a filesystem-change journal, marking nodes whose edges match
    /// as dirty, along with every ancestor that can reach them.
    ///
    /// Returns the number of nodes marked dirty.
    pub fn respond_to_fs_events(&self, events: &[FsEvent]) -> usize {
        let mut state = self.state.lock().expect("request graph lock");
        let mut dirty: HashSet<String> = state
            .nodes
            .iter()
            .filter(|(_, node)| {
                node.invalidations
                    .iter()
                    .any(|edge| events.iter().any(|event| edge.matches(event)))
            })
            .map(|(id, _)| id.clone())
            .collect();

        Self::propagate_to_ancestors(&state.nodes, &mut dirty);
        for id in &dirty {
            if let Some(node) = state.nodes.get_mut(id) {
                node.dirty = true;
            }
        }
        tracing::debug!(dirtied = dirty.len(), events = events.len(), "Consumed change journal");
        dirty.len()
    }

    /// Mark every node holding a startup edge (and its ancestors) dirty.
    ///
    /// Called once at the start of a process before the first build.
    pub fn invalidate_startup_nodes(&self) -> usize {
        let mut state = self.state.lock().expect("request graph lock");
        let mut dirty: HashSet<String> = state
            .nodes
            .iter()
            .filter(|(_, node)| node.invalidations.contains(&Invalidation::Startup))
            .map(|(id, _)| id.clone())
            .collect();

        Self::propagate_to_ancestors(&state.nodes, &mut dirty);
        for id in &dirty {
            if let Some(node) = state.nodes.get_mut(id) {
                node.dirty = true;
            }
        }
        dirty.len()
    }

    fn propagate_to_ancestors(nodes: &HashMap<String, RequestNode<R>>, dirty: &mut HashSet<String>) {
        loop {
            let next: Vec<String> = nodes
                .iter()
                .filter(|(id, node)| {
                    !dirty.contains(*id) && node.children.iter().any(|child| dirty.contains(child))
                })
                .map(|(id, _)| id.clone())
                .collect();
            if next.is_empty() {
                break;
            }
            dirty.extend(next);
        }
    }

    /// Number of request nodes currently tracked.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.state.lock().expect("request graph lock").nodes.len()
    }

    /// Ids of every tracked node.
    #[must_use]
    pub fn node_ids(&self) -> Vec<String> {
        self.state
            .lock()
            .expect("request graph lock")
            .nodes
            .keys()
            .cloned()
            .collect()
    }

    /// Whether a node with the given id holds a result.
    #[must_use]
    pub fn has_node(&self, id: &str) -> bool {
        self.state
            .lock()
            .expect("request graph lock")
            .nodes
            .contains_key(id)
    }

    /// The invalidation edges recorded against a node.
    #[must_use]
    pub fn invalidations_of(&self, id: &str) -> Option<HashSet<Invalidation>> {
        self.state
            .lock()
            .expect("request graph lock")
            .nodes
            .get(id)
            .map(|node| node.invalidations.clone())
    }

    /// The child requests a node transitively invoked.
    #[must_use]
    pub fn children_of(&self, id: &str) -> Option<HashSet<String>> {
        self.state
            .lock()
            .expect("request graph lock")
            .nodes
            .get(id)
            .map(|node| node.children.clone())
    }
}

#[derive(Debug, Default)]
struct ApiBuffer {
    invalidations: HashSet<Invalidation>,
    children: HashSet<String>,
}

/// The API surface handed to a running request.
///
/// Edges accumulate in a per-run buffer and only reach the node when the
/// run succeeds.
pub struct RequestApi<R> {
    graph: Arc<RequestGraph<R>>,
    chain: Vec<String>,
    buffer: Mutex<ApiBuffer>,
}

impl<R> RequestApi<R>
where
    R: Clone + Send + Sync + 'static,
{
    /// Re-run the request when the file at `path` changes.
    pub fn invalidate_on_file_update(&self, path: impl Into<std::path::PathBuf>) {
        self.push(Invalidation::FileUpdate(path.into()));
    }

    /// Re-run the request when the file at `path` is deleted.
    pub fn invalidate_on_file_delete(&self, path: impl Into<std::path::PathBuf>) {
        self.push(Invalidation::FileDelete(path.into()));
    }

    /// Re-run the request when a file matching `glob` is created.
    pub fn invalidate_on_file_create(&self, glob: impl Into<String>) {
        self.push(Invalidation::FileCreate(glob.into()));
    }

    /// Re-run the request on every process startup.
    pub fn invalidate_on_startup(&self) {
        self.push(Invalidation::Startup);
    }

    fn push(&self, invalidation: Invalidation) {
        self.buffer
            .lock()
            .expect("request api lock")
            .invalidations
            .insert(invalidation);
    }

    /// Run a child request, recording it under the current node.
    ///
    /// The child's result is stored before the parent's own result, so a
    /// later invalidation of the child re-runs the parent as well.
    ///
    /// # Errors
    ///
    /// Returns the child's error, or a cycle error if the child is already
    /// running further up this call chain.
    pub async fn run_request<Q>(&self, req: &Q) -> Result<R>
    where
        Q: Request<R> + ?Sized,
    {
        self.buffer
            .lock()
            .expect("request api lock")
            .children
            .insert(req.id());
        self.graph.run_inner(req, &self.chain).await
    }

    fn into_buffer(self) -> ApiBuffer {
        self.buffer.into_inner().expect("request api lock")
    }
}

/// Releases the in-flight marker when a running request future is dropped
/// before completing, so deduplicated waiters retry instead of hanging.
struct InflightGuard<R> {
    graph: Arc<RequestGraph<R>>,
    id: String,
    armed: bool,
}

impl<R> Drop for InflightGuard<R> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut state) = self.graph.state.lock() {
            state.inflight.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct TestRequest {
        id: String,
        runs: Arc<AtomicUsize>,
        edges: Vec<Invalidation>,
        child: Option<Arc<TestRequest>>,
        fail: Arc<AtomicBool>,
        delay: Option<Duration>,
    }

    impl TestRequest {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                runs: Arc::new(AtomicUsize::new(0)),
                edges: Vec::new(),
                child: None,
                fail: Arc::new(AtomicBool::new(false)),
                delay: None,
            }
        }

        fn with_edges(mut self, edges: Vec<Invalidation>) -> Self {
            self.edges = edges;
            self
        }

        fn with_child(mut self, child: Arc<TestRequest>) -> Self {
            self.child = Some(child);
            self
        }
    }

    #[async_trait]
    impl Request<String> for TestRequest {
        fn id(&self) -> String {
            self.id.clone()
        }

        async fn run(&self, api: &RequestApi<String>) -> Result<String> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
            for edge in &self.edges {
                match edge {
                    Invalidation::FileUpdate(p) => api.invalidate_on_file_update(p.clone()),
                    Invalidation::FileDelete(p) => api.invalidate_on_file_delete(p.clone()),
                    Invalidation::FileCreate(g) => api.invalidate_on_file_create(g.clone()),
                    Invalidation::Startup => api.invalidate_on_startup(),
                }
            }
            if let Some(child) = &self.child {
                api.run_request(child.as_ref()).await?;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(Error::invalid_input(format!("{} refused", self.id)));
            }
            Ok(format!("{}:run{}", self.id, run))
        }
    }

    #[tokio::test]
    async fn second_run_is_memoized() {
        let graph = Arc::new(RequestGraph::new());
        let req = TestRequest::new("a");
        let runs = Arc::clone(&req.runs);

        let first = graph.run_request(&req).await.unwrap();
        let second = graph.run_request(&req).await.unwrap();
        assert_eq!(first, "a:run1");
        assert_eq!(second, first);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrent_identical_requests_share_one_execution() {
        let graph = Arc::new(RequestGraph::new());
        let mut req = TestRequest::new("slow");
        req.delay = Some(Duration::from_millis(50));
        let req = Arc::new(req);
        let runs = Arc::clone(&req.runs);

        let a = {
            let graph = Arc::clone(&graph);
            let req = Arc::clone(&req);
            tokio::spawn(async move { graph.run_request(req.as_ref()).await })
        };
        let b = {
            let graph = Arc::clone(&graph);
            let req = Arc::clone(&req);
            tokio::spawn(async move { graph.run_request(req.as_ref()).await })
        };

        let (a, b) = (a.await.unwrap().unwrap(), b.await.unwrap().unwrap());
        assert_eq!(a, b);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn file_update_event_dirties_node_and_forces_rerun() {
        let graph = Arc::new(RequestGraph::new());
        let path = PathBuf::from("/src/a.js");
        let req =
            TestRequest::new("a").with_edges(vec![Invalidation::FileUpdate(path.clone())]);
        let runs = Arc::clone(&req.runs);

        graph.run_request(&req).await.unwrap();
        assert_eq!(graph.respond_to_fs_events(&[FsEvent::Updated(path)]), 1);
        let result = graph.run_request(&req).await.unwrap();
        assert_eq!(result, "a:run2");
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unrelated_event_leaves_node_memoized() {
        let graph = Arc::new(RequestGraph::new());
        let req = TestRequest::new("a")
            .with_edges(vec![Invalidation::FileUpdate("/src/a.js".into())]);
        let runs = Arc::clone(&req.runs);

        graph.run_request(&req).await.unwrap();
        assert_eq!(
            graph.respond_to_fs_events(&[FsEvent::Updated("/src/other.js".into())]),
            0
        );
        graph.run_request(&req).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn dirty_child_dirties_ancestors() {
        let graph = Arc::new(RequestGraph::new());
        let child = Arc::new(
            TestRequest::new("child")
                .with_edges(vec![Invalidation::FileUpdate("/src/dep.js".into())]),
        );
        let parent = TestRequest::new("parent").with_child(Arc::clone(&child));
        let parent_runs = Arc::clone(&parent.runs);

        graph.run_request(&parent).await.unwrap();
        assert_eq!(
            graph.respond_to_fs_events(&[FsEvent::Updated("/src/dep.js".into())]),
            2
        );
        graph.run_request(&parent).await.unwrap();
        assert_eq!(parent_runs.load(Ordering::SeqCst), 2);
        assert_eq!(child.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn create_glob_edge_fires_on_matching_creation() {
        let graph = Arc::new(RequestGraph::new());
        let req = TestRequest::new("a")
            .with_edges(vec![Invalidation::FileCreate("/src/**/*.config.js".into())]);

        graph.run_request(&req).await.unwrap();
        assert_eq!(
            graph.respond_to_fs_events(&[FsEvent::Created("/src/app/web.config.js".into())]),
            1
        );
    }

    #[tokio::test]
    async fn startup_edge_is_consumed_by_startup_invalidation() {
        let graph = Arc::new(RequestGraph::new());
        let req = TestRequest::new("a").with_edges(vec![Invalidation::Startup]);
        let runs = Arc::clone(&req.runs);

        graph.run_request(&req).await.unwrap();
        assert_eq!(graph.invalidate_startup_nodes(), 1);
        graph.run_request(&req).await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failure_leaves_node_unresolved_and_discards_edges() {
        let graph = Arc::new(RequestGraph::new());
        let req = TestRequest::new("flaky")
            .with_edges(vec![Invalidation::FileUpdate("/src/a.js".into())]);
        req.fail.store(true, Ordering::SeqCst);

        assert!(graph.run_request(&req).await.is_err());
        assert!(!graph.has_node("flaky"));
        assert!(graph.invalidations_of("flaky").is_none());

        // A later run retries and succeeds.
        req.fail.store(false, Ordering::SeqCst);
        let result = graph.run_request(&req).await.unwrap();
        assert_eq!(result, "flaky:run2");
    }

    #[tokio::test]
    async fn failing_request_does_not_poison_siblings() {
        let graph = Arc::new(RequestGraph::new());
        let bad = TestRequest::new("bad");
        bad.fail.store(true, Ordering::SeqCst);
        let good = TestRequest::new("good");

        assert!(graph.run_request(&bad).await.is_err());
        assert!(graph.run_request(&good).await.is_ok());
        assert!(graph.has_node("good"));
    }

    #[tokio::test]
    async fn direct_cycle_fails_with_typed_error() {
        struct Cyclic;

        #[async_trait]
        impl Request<String> for Cyclic {
            fn id(&self) -> String {
                "loop".into()
            }
            async fn run(&self, api: &RequestApi<String>) -> Result<String> {
                api.run_request(self).await
            }
        }

        let graph = Arc::new(RequestGraph::new());
        let err = graph.run_request(&Cyclic).await.unwrap_err();
        assert!(matches!(err, Error::RequestCycle { .. }));
    }

    #[tokio::test]
    async fn indirect_cycle_fails_with_typed_error() {
        // a -> b -> a, expressed through a shared id on the inner leg.
        let a_leaf = Arc::new(TestRequest::new("a"));
        let b = Arc::new(TestRequest::new("b").with_child(a_leaf));
        let a = TestRequest::new("a").with_child(b);

        let graph = Arc::new(RequestGraph::new());
        let err = graph.run_request(&a).await.unwrap_err();
        match err {
            Error::RequestCycle { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("expected cycle error, got {other}"),
        }
    }

    #[tokio::test]
    async fn child_result_is_recorded_under_parent() {
        let graph = Arc::new(RequestGraph::new());
        let child = Arc::new(TestRequest::new("child"));
        let parent = TestRequest::new("parent").with_child(child);

        graph.run_request(&parent).await.unwrap();
        assert!(graph.has_node("child"));
        let children = graph.children_of("parent").unwrap();
        assert!(children.contains("child"));
        assert_eq!(graph.node_count(), 2);
    }
}
