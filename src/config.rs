use crate::error::{Error, Result};

/// Largest pool a [`Config`] may ask for.
pub const MAX_THREADS: usize = 1024;

/// Settings used when the crate has to create a pool of its own.
#[derive(Debug, Clone)]
pub struct Config {
    pub num_threads: Option<usize>,
    pub stack_size: Option<usize>,
    pub thread_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: None,
            stack_size: Some(2 * 1024 * 1024),
            thread_name_prefix: "bginit-worker".to_string(),
        }
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(n) = self.num_threads {
            if n == 0 {
                return Err(Error::config("num_threads must be > 0"));
            }
            if n > MAX_THREADS {
                return Err(Error::config(format!("num_threads too large (max {})", MAX_THREADS)));
            }
        }

        if let Some(size) = self.stack_size {
            if size == 0 {
                return Err(Error::config("stack_size must be > 0"));
            }
        }

        if self.thread_name_prefix.is_empty() {
            return Err(Error::config("thread_name_prefix must not be empty"));
        }

        Ok(())
    }

    pub fn worker_threads(&self) -> usize {
        self.num_threads.unwrap_or_else(num_cpus::get)
    }

    /// Copy of this config with the thread count pinned to `capacity`, kept
    /// within `1..=MAX_THREADS`. Work beyond the ceiling queues on the pool.
    pub(crate) fn with_capacity(&self, capacity: usize) -> Config {
        Config {
            num_threads: Some(capacity.clamp(1, MAX_THREADS)),
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn num_threads(mut self, n: usize) -> Self {
        self.config.num_threads = Some(n);
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.config.stack_size = Some(size);
        self
    }

    pub fn thread_name_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}
