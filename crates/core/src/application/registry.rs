// Job Definition Registry - static catalog of queues and job types

use crate::domain::catalog::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, STANDARD_JOB_TYPES, STANDARD_QUEUES,
};
use crate::domain::{JobTypeDefinition, QueueDefinition, RetryPolicy};
use crate::error::{AppError, Result};
use std::collections::{BTreeMap, HashMap};

/// Immutable catalog of queues, job types and the default retry policy
///
/// Built once at boot and shared read-only (`Arc<JobRegistry>`).
#[derive(Debug, Clone)]
pub struct JobRegistry {
    queues: Vec<QueueDefinition>,
    job_types: HashMap<String, JobTypeDefinition>,
    retry_policy: RetryPolicy,
}

impl JobRegistry {
    pub fn builder() -> JobRegistryBuilder {
        JobRegistryBuilder::default()
    }

    /// The five standard queues and job types with the default retry policy
    pub fn standard() -> Self {
        let queues: Vec<QueueDefinition> = STANDARD_QUEUES
            .iter()
            .map(|(name, concurrency)| QueueDefinition::new(*name, *concurrency))
            .collect();
        let job_types = STANDARD_JOB_TYPES
            .iter()
            .filter_map(|(job_type, queue_name)| {
                let queue = queues.iter().find(|q| q.name == *queue_name)?.clone();
                Some((
                    job_type.to_string(),
                    JobTypeDefinition {
                        name: job_type.to_string(),
                        queue,
                    },
                ))
            })
            .collect();

        Self {
            queues,
            job_types,
            retry_policy: RetryPolicy::exponential(
                DEFAULT_MAX_ATTEMPTS,
                DEFAULT_RETRY_BASE_DELAY_MS,
            ),
        }
    }

    /// Builder pre-loaded with the standard catalog, for overrides
    pub fn standard_builder() -> JobRegistryBuilder {
        let mut builder = JobRegistryBuilder::default();
        for (name, concurrency) in STANDARD_QUEUES {
            builder = builder.queue(name, concurrency);
        }
        for (job_type, queue) in STANDARD_JOB_TYPES {
            builder = builder.job_type(job_type, queue);
        }
        builder
    }

    /// Queue a job type runs on
    pub fn queue_for(&self, job_type: &str) -> Result<&QueueDefinition> {
        self.job_types
            .get(job_type)
            .map(|def| &def.queue)
            .ok_or_else(|| AppError::UnknownJobType(job_type.to_string()))
    }

    pub fn is_registered(&self, job_type: &str) -> bool {
        self.job_types.contains_key(job_type)
    }

    /// Every defined queue, in definition order
    pub fn queues(&self) -> &[QueueDefinition] {
        &self.queues
    }

    pub fn queue(&self, name: &str) -> Option<&QueueDefinition> {
        self.queues.iter().find(|q| q.name == name)
    }

    /// Job types grouped by queue (sorted, for display)
    pub fn job_types_by_queue(&self) -> BTreeMap<String, Vec<String>> {
        let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for def in self.job_types.values() {
            grouped
                .entry(def.queue.name.clone())
                .or_default()
                .push(def.name.clone());
        }
        for names in grouped.values_mut() {
            names.sort();
        }
        grouped
    }

    /// Default retry policy for jobs without an override
    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry_policy
    }
}

/// Validating builder for [`JobRegistry`]
#[derive(Debug, Clone)]
pub struct JobRegistryBuilder {
    queues: Vec<QueueDefinition>,
    job_types: Vec<(String, String)>,
    concurrency_overrides: Vec<(String, usize)>,
    retry_policy: RetryPolicy,
}

impl Default for JobRegistryBuilder {
    fn default() -> Self {
        Self {
            queues: Vec::new(),
            job_types: Vec::new(),
            concurrency_overrides: Vec::new(),
            retry_policy: RetryPolicy::exponential(
                DEFAULT_MAX_ATTEMPTS,
                DEFAULT_RETRY_BASE_DELAY_MS,
            ),
        }
    }
}

impl JobRegistryBuilder {
    pub fn queue(mut self, name: impl Into<String>, concurrency: usize) -> Self {
        self.queues.push(QueueDefinition::new(name, concurrency));
        self
    }

    pub fn job_type(mut self, name: impl Into<String>, queue: impl Into<String>) -> Self {
        self.job_types.push((name.into(), queue.into()));
        self
    }

    /// Replace the concurrency of an already defined queue
    pub fn concurrency(mut self, queue: impl Into<String>, concurrency: usize) -> Self {
        self.concurrency_overrides.push((queue.into(), concurrency));
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn build(self) -> Result<JobRegistry> {
        let mut queues = self.queues;

        for (name, concurrency) in self.concurrency_overrides {
            let queue = queues
                .iter_mut()
                .find(|q| q.name == name)
                .ok_or_else(|| {
                    AppError::Config(format!("concurrency override for unknown queue '{}'", name))
                })?;
            queue.concurrency = concurrency;
        }

        for (idx, queue) in queues.iter().enumerate() {
            if queue.name.trim().is_empty() {
                return Err(AppError::Config("queue name must not be empty".to_string()));
            }
            if queue.concurrency == 0 {
                return Err(AppError::Config(format!(
                    "queue '{}' must have concurrency >= 1",
                    queue.name
                )));
            }
            if queues[..idx].iter().any(|q| q.name == queue.name) {
                return Err(AppError::Config(format!(
                    "duplicate queue '{}'",
                    queue.name
                )));
            }
        }

        let mut job_types = HashMap::with_capacity(self.job_types.len());
        for (name, queue_name) in self.job_types {
            let queue = queues
                .iter()
                .find(|q| q.name == queue_name)
                .cloned()
                .ok_or_else(|| {
                    AppError::Config(format!(
                        "job type '{}' is bound to undefined queue '{}'",
                        name, queue_name
                    ))
                })?;
            if job_types.contains_key(&name) {
                return Err(AppError::Config(format!("duplicate job type '{}'", name)));
            }
            job_types.insert(name.clone(), JobTypeDefinition { name, queue });
        }

        Ok(JobRegistry {
            queues,
            job_types,
            retry_policy: self.retry_policy,
        })
    }
}
