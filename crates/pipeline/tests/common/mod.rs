//! Shared fixtures for pipeline integration tests: a scriptable mock
//! transformer with call counters, a static config service, and a
//! path-joining resolver.

// Each test binary exercises a different subset of the fixtures.
#![allow(dead_code)]

use async_trait::async_trait;
use kiln_core::fingerprint::fingerprint_file;
use kiln_core::{Asset, Ast, Content, ConnectedFile, Env, Error, Result, TransformerResult};
use kiln_pipeline::{
    ConfigRequestResult, ConfigService, Generated, Options, Pipeline, RequestResult, Resolver,
    TransformHost, Transformer, TransformerConfig, TransformerOutput,
};
use kiln_request_graph::RequestGraph;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Per-hook invocation counters.
#[derive(Debug, Default)]
pub struct Calls {
    pub get_config: AtomicUsize,
    pub parse: AtomicUsize,
    pub transform: AtomicUsize,
    pub generate: AtomicUsize,
    pub post_process: AtomicUsize,
}

impl Calls {
    pub fn transforms(&self) -> usize {
        self.transform.load(Ordering::SeqCst)
    }
    pub fn generates(&self) -> usize {
        self.generate.load(Ordering::SeqCst)
    }
    pub fn parses(&self) -> usize {
        self.parse.load(Ordering::SeqCst)
    }
}

/// One emitted transform result.
pub struct EmitSpec {
    pub asset_type: String,
    pub content: String,
    pub with_ast: bool,
}

/// What a mock's transform hook emits.
pub enum Emit {
    Forward,
    Nothing,
    Results(Vec<EmitSpec>),
}

/// A scriptable transformer.
pub struct MockTransformer {
    id: String,
    pub calls: Arc<Calls>,
    emit: Emit,
    parses: bool,
    reusable_from: Vec<String>,
    generated: Option<String>,
    merge_post_process: bool,
    config: Option<ConfigRequestResult>,
    connect: Vec<PathBuf>,
}

impl MockTransformer {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: Arc::new(Calls::default()),
            emit: Emit::Forward,
            parses: false,
            reusable_from: Vec::new(),
            generated: None,
            merge_post_process: false,
            config: None,
            connect: Vec::new(),
        }
    }

    /// Emit a single result of the given type and content.
    pub fn emits(mut self, asset_type: &str, content: &str) -> Self {
        self.emit = Emit::Results(vec![EmitSpec {
            asset_type: asset_type.to_string(),
            content: content.to_string(),
            with_ast: false,
        }]);
        self
    }

    /// Emit a single result carrying an AST owned by this transformer.
    pub fn emits_with_ast(mut self, asset_type: &str, content: &str) -> Self {
        self.emit = Emit::Results(vec![EmitSpec {
            asset_type: asset_type.to_string(),
            content: content.to_string(),
            with_ast: true,
        }]);
        self
    }

    /// Emit several results.
    pub fn emits_many(mut self, specs: Vec<(&str, &str)>) -> Self {
        self.emit = Emit::Results(
            specs
                .into_iter()
                .map(|(asset_type, content)| EmitSpec {
                    asset_type: asset_type.to_string(),
                    content: content.to_string(),
                    with_ast: false,
                })
                .collect(),
        );
        self
    }

    /// Emit nothing at all.
    pub fn emits_nothing(mut self) -> Self {
        self.emit = Emit::Nothing;
        self
    }

    /// Expose a parse hook producing an AST owned by this transformer.
    pub fn with_parse(mut self) -> Self {
        self.parses = true;
        self
    }

    /// Declare which producers' ASTs this transformer can consume.
    pub fn reuses_ast_from(mut self, producers: &[&str]) -> Self {
        self.reusable_from = producers.iter().map(|p| (*p).to_string()).collect();
        self
    }

    /// Expose a generate hook producing the given content.
    pub fn generates(mut self, content: &str) -> Self {
        self.generated = Some(content.to_string());
        self
    }

    /// Expose a post-process hook that merges all assets into one.
    pub fn merges_in_post_process(mut self) -> Self {
        self.merge_post_process = true;
        self
    }

    /// Expose a get_config hook returning the given request metadata.
    pub fn with_config(mut self, request: ConfigRequestResult) -> Self {
        self.config = Some(request);
        self
    }

    /// Declare connected files recorded (with their current hash) on every
    /// transform.
    pub fn connects(mut self, paths: Vec<PathBuf>) -> Self {
        self.connect = paths;
        self
    }
}

#[async_trait]
impl Transformer for MockTransformer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn get_config(
        &self,
        _asset: &mut Asset,
        _options: &Options,
        _resolver: &dyn Resolver,
    ) -> Result<Option<TransformerConfig>> {
        self.calls.get_config.fetch_add(1, Ordering::SeqCst);
        Ok(self.config.as_ref().map(|request| TransformerConfig {
            value: serde_json::json!({ "plugin": self.id }),
            request: request.clone(),
        }))
    }

    fn can_reuse_ast(&self, ast: &Ast) -> bool {
        self.reusable_from.contains(&ast.producer_id)
    }

    async fn parse(
        &self,
        asset: &Asset,
        _config: Option<&TransformerConfig>,
        _options: &Options,
    ) -> Result<Option<Ast>> {
        self.calls.parse.fetch_add(1, Ordering::SeqCst);
        if self.parses {
            Ok(Some(Ast::new(
                &self.id,
                serde_json::json!({ "parsed_from": asset.hash }),
            )))
        } else {
            Ok(None)
        }
    }

    async fn transform(
        &self,
        asset: &mut Asset,
        _config: Option<&TransformerConfig>,
        _options: &Options,
        _resolver: &dyn Resolver,
    ) -> Result<Vec<TransformerOutput>> {
        self.calls.transform.fetch_add(1, Ordering::SeqCst);
        for path in &self.connect {
            let (hash, _) = fingerprint_file(path)?;
            asset.add_connected_file(ConnectedFile {
                file_path: path.clone(),
                hash,
            });
        }
        match &self.emit {
            Emit::Forward => Ok(vec![TransformerOutput::Forward]),
            Emit::Nothing => Ok(vec![]),
            Emit::Results(specs) => Ok(specs
                .iter()
                .map(|spec| {
                    let mut result =
                        TransformerResult::new(spec.asset_type.clone(), spec.content.clone());
                    if spec.with_ast {
                        result.ast = Some(Ast::new(
                            &self.id,
                            serde_json::json!({ "emitted": spec.content }),
                        ));
                    }
                    TransformerOutput::Result(result)
                })
                .collect()),
        }
    }

    async fn generate(
        &self,
        _asset: &Asset,
        _ast: &Ast,
        _options: &Options,
    ) -> Result<Option<Generated>> {
        self.calls.generate.fetch_add(1, Ordering::SeqCst);
        Ok(self.generated.as_ref().map(|content| Generated {
            content: Content::Buffer(content.clone().into_bytes()),
            map: None,
        }))
    }

    async fn post_process(
        &self,
        assets: Vec<Asset>,
        _config: Option<&TransformerConfig>,
        _options: &Options,
        _resolver: &dyn Resolver,
    ) -> Result<Option<Vec<Asset>>> {
        self.calls.post_process.fetch_add(1, Ordering::SeqCst);
        if !self.merge_post_process {
            return Ok(None);
        }
        let Some(first) = assets.first() else {
            return Ok(Some(Vec::new()));
        };
        let mut pieces = Vec::new();
        for asset in &assets {
            if let Content::Buffer(bytes) = &asset.content {
                pieces.push(String::from_utf8_lossy(bytes).into_owned());
            }
        }
        let mut merged = first.clone();
        merged.set_code(pieces.join("\n").into_bytes());
        Ok(Some(vec![merged]))
    }
}

/// Config service serving interned pipelines by file extension.
pub struct StaticConfig {
    pipelines: HashMap<String, Pipeline>,
    cache_path: PathBuf,
    config_file: Option<PathBuf>,
}

impl StaticConfig {
    pub fn new(cache_path: impl Into<PathBuf>) -> Self {
        Self {
            pipelines: HashMap::new(),
            cache_path: cache_path.into(),
            config_file: None,
        }
    }

    pub fn with_pipeline(mut self, ext: &str, transformers: Vec<Arc<MockTransformer>>) -> Self {
        let transformers = transformers
            .into_iter()
            .map(|t| t as Arc<dyn Transformer>)
            .collect();
        self.pipelines
            .insert(ext.to_string(), Pipeline::new(transformers));
        self
    }
}

impl ConfigService for StaticConfig {
    fn pipeline_for(&self, path: &Path) -> Result<Pipeline> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        self.pipelines
            .get(ext)
            .cloned()
            .ok_or_else(|| Error::invalid_input(format!("No pipeline for type '{ext}'")))
    }

    fn cache_path(&self) -> PathBuf {
        self.cache_path.clone()
    }

    fn config_file(&self) -> Option<PathBuf> {
        self.config_file.clone()
    }
}

/// Resolver that joins specifiers onto the importing file's directory.
pub struct JoinResolver;

#[async_trait]
impl Resolver for JoinResolver {
    async fn resolve(&self, _env: &Env, specifier: &str, from: &Path) -> Result<PathBuf> {
        let base = from.parent().unwrap_or_else(|| Path::new("/"));
        Ok(base.join(specifier))
    }
}

/// Build a host and a fresh request graph over the given config service.
pub fn harness(
    options: Options,
    config: StaticConfig,
) -> (Arc<TransformHost>, Arc<RequestGraph<RequestResult>>) {
    let host = Arc::new(TransformHost::new(
        Arc::new(options),
        Arc::new(config),
        Arc::new(JoinResolver),
    ));
    (host, Arc::new(RequestGraph::new()))
}
