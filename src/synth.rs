//! Natural-language check descriptions to SQL.
//!
//! [`LlmSynthesizer`] asks the generation backend for a single query and
//! refuses anything that is not a read statement. Hand-written SQL from the
//! catalog goes through [`compile_inline`] and the same read-only guard.
//!
//! Requests expose [`SynthesisRequest::cache_key`], a hash of the description
//! and schema hint, so a cache can sit in front of any synthesizer;
//! [`CachingSynthesizer`] is the in-process one.

use std::{
    collections::HashMap,
    hash::{DefaultHasher, Hash, Hasher},
    sync::{Arc, RwLock}
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use crate::{
    catalog::CheckDefinition,
    error::SynthesisError,
    llm::{GenerationBackend, GenerationRequest, strip_code_fence},
    query::{SqlDialect, ensure_read_only}
};

/// Model identifier recorded for SQL taken verbatim from the catalog.
pub const INLINE_MODEL: &str = "inline";

/// Input to a synthesizer.
#[derive(Debug, Clone)]
pub struct SynthesisRequest {
    pub check:       String,
    pub description: String,
    pub schema_hint: Option<String>,
    pub examples:    Option<String>
}

impl SynthesisRequest {
    pub fn for_check(check: &CheckDefinition, schema_hint: Option<&str>) -> Self {
        Self {
            check:       check.name.clone(),
            description: check.description.clone(),
            schema_hint: schema_hint.map(str::to_string),
            examples:    check.examples.clone()
        }
    }

    /// Stable key over (description, schema hint).
    pub fn cache_key(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.description.trim().hash(&mut hasher);
        self.schema_hint.as_deref().map(str::trim).hash(&mut hasher);
        hasher.finish()
    }
}

/// SQL produced for one check in one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub check:        String,
    pub sql:          String,
    pub generated_at: DateTime<Utc>,
    pub model:        String
}

/// Converts a check description into one read-only SQL statement.
#[async_trait]
pub trait QuerySynthesizer: Send + Sync {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<CompiledQuery, SynthesisError>;
}

#[async_trait]
impl<S: QuerySynthesizer + ?Sized> QuerySynthesizer for Arc<S> {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<CompiledQuery, SynthesisError> {
        (**self).synthesize(request).await
    }
}

/// Synthesizer backed by a language model.
pub struct LlmSynthesizer {
    backend:   Arc<dyn GenerationBackend>,
    dialect:   SqlDialect,
    row_limit: u64
}

impl LlmSynthesizer {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self {
            backend,
            dialect: SqlDialect::BigQuery,
            row_limit: 100
        }
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_row_limit(mut self, row_limit: u64) -> Self {
        self.row_limit = row_limit;
        self
    }

    fn build_request(&self, request: &SynthesisRequest) -> GenerationRequest {
        let mut prompt = String::from(
            "Write one SQL query for the following analytics data check.\n\n"
        );
        if let Some(schema) = &request.schema_hint {
            prompt.push_str(schema.trim());
            prompt.push_str("\n\n");
        }
        prompt.push_str(&format!("Check: {}\n\n", request.description.trim()));
        prompt.push_str(&format!(
            "Rules:\n\
             - Standard SQL as accepted by BigQuery\n\
             - Only columns present in the schema\n\
             - Return rows only when something is wrong or noteworthy; an empty result means the check passed\n\
             - Include context columns such as date, platform or event name\n\
             - At most {} rows\n\
             - A single SELECT statement; never modify data\n",
            self.row_limit
        ));
        if let Some(examples) = &request.examples {
            prompt.push_str("\nReference queries:\n");
            prompt.push_str(examples.trim());
            prompt.push('\n');
        }
        GenerationRequest {
            system:      String::from(
                "You write BigQuery SQL. Answer with the SQL only; explanations belong in SQL comments."
            ),
            prompt,
            temperature: Some(0.3)
        }
    }
}

#[async_trait]
impl QuerySynthesizer for LlmSynthesizer {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<CompiledQuery, SynthesisError> {
        let generated = self
            .backend
            .complete(&self.build_request(request))
            .await
            .map_err(|e| SynthesisError::Backend(e.to_string()))?;
        let sql = strip_code_fence(&generated);
        if sql.is_empty() {
            return Err(SynthesisError::Malformed("empty response".to_string()));
        }
        let inspected = ensure_read_only(sql, self.dialect)?;
        debug!(check = %request.check, tables = ?inspected.tables, "generated SQL accepted");
        Ok(CompiledQuery {
            check:        request.check.clone(),
            sql:          sql.to_string(),
            generated_at: Utc::now(),
            model:        self.backend.model_id().to_string()
        })
    }
}

/// Validate SQL written directly in the catalog.
pub fn compile_inline(
    check: &CheckDefinition,
    sql: &str,
    dialect: SqlDialect
) -> Result<CompiledQuery, SynthesisError> {
    let sql = sql.trim();
    ensure_read_only(sql, dialect)?;
    Ok(CompiledQuery {
        check:        check.name.clone(),
        sql:          sql.to_string(),
        generated_at: Utc::now(),
        model:        INLINE_MODEL.to_string()
    })
}

/// Cache in front of another synthesizer, keyed on
/// [`SynthesisRequest::cache_key`].
pub struct CachingSynthesizer<S> {
    inner:    S,
    cache:    RwLock<HashMap<u64, CompiledQuery>>,
    max_size: usize
}

impl<S: QuerySynthesizer> CachingSynthesizer<S> {
    pub fn new(inner: S, max_size: usize) -> Self {
        Self {
            inner,
            cache: RwLock::new(HashMap::with_capacity(max_size)),
            max_size: max_size.max(1)
        }
    }

    pub fn len(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: u64) -> Option<CompiledQuery> {
        self.cache.read().ok()?.get(&key).cloned()
    }

    fn insert(&self, key: u64, compiled: CompiledQuery) {
        let Ok(mut cache) = self.cache.write() else {
            return;
        };
        // Simple eviction: clear half when full
        if cache.len() >= self.max_size {
            let keys: Vec<_> = cache.keys().take(self.max_size.div_ceil(2)).copied().collect();
            for key in keys {
                cache.remove(&key);
            }
        }
        cache.insert(key, compiled);
    }
}

#[async_trait]
impl<S: QuerySynthesizer> QuerySynthesizer for CachingSynthesizer<S> {
    async fn synthesize(&self, request: &SynthesisRequest) -> Result<CompiledQuery, SynthesisError> {
        let key = request.cache_key();
        if let Some(mut hit) = self.get(key) {
            debug!(check = %request.check, "reusing cached SQL");
            hit.check = request.check.clone();
            return Ok(hit);
        }
        let compiled = self.inner.synthesize(request).await?;
        self.insert(key, compiled.clone());
        Ok(compiled)
    }
}
