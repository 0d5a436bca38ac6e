// Queue Domain Model

/// Queue configuration, immutable after boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueDefinition {
    pub name: String,
    pub concurrency: usize,
}

impl QueueDefinition {
    pub fn new(name: impl Into<String>, concurrency: usize) -> Self {
        Self {
            name: name.into(),
            concurrency,
        }
    }
}

/// Binding of a job type to the queue it runs on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobTypeDefinition {
    pub name: String,
    pub queue: QueueDefinition,
}
