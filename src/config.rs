/// Server configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Simulation tick rate in Hz
    pub tick_rate: u32,
    /// Snapshot broadcast rate in Hz, must divide the tick rate
    pub snapshot_rate: u32,
    /// Maximum one-way latency the server rewinds for, in milliseconds
    pub max_rewind_ms: u32,
    /// Maximum entities in the world
    pub max_entities: usize,
    /// Input buffer capacity shared by all connections
    pub input_buffer_capacity: usize,
    /// Port for the Prometheus metrics endpoint
    pub metrics_port: u16,
    /// Scripted entities spawned by the soak binary
    pub soak_entities: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            tick_rate: crate::game::constants::timing::TICK_RATE,
            snapshot_rate: crate::game::constants::timing::SNAPSHOT_RATE,
            max_rewind_ms: crate::game::constants::combat::MAX_REWIND_MS,
            max_entities: crate::game::constants::net::MAX_ENTITIES_PER_SNAPSHOT,
            input_buffer_capacity: 1024,
            metrics_port: 9090,
            soak_entities: 64,
        }
    }
}

impl SyncConfig {
    /// Load config from environment or use defaults
    pub fn load_or_default() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("SNAPSHOT_RATE") {
            if let Ok(parsed) = rate.parse::<u32>() {
                if parsed > 0 && config.tick_rate % parsed == 0 {
                    config.snapshot_rate = parsed;
                } else {
                    tracing::warn!("SNAPSHOT_RATE must divide the tick rate, using default");
                }
            } else {
                tracing::warn!("Invalid SNAPSHOT_RATE '{}', using default", rate);
            }
        }

        if let Ok(rewind) = std::env::var("MAX_REWIND_MS") {
            if let Ok(parsed) = rewind.parse::<u32>() {
                if parsed <= crate::game::constants::combat::HISTORY_WINDOW_MS {
                    config.max_rewind_ms = parsed;
                } else {
                    tracing::warn!("MAX_REWIND_MS cannot exceed the history window, using default");
                }
            } else {
                tracing::warn!("Invalid MAX_REWIND_MS '{}', using default", rewind);
            }
        }

        if let Ok(capacity) = std::env::var("INPUT_BUFFER_CAPACITY") {
            if let Ok(parsed) = capacity.parse::<usize>() {
                if parsed > 0 && parsed <= 65536 {
                    config.input_buffer_capacity = parsed;
                } else {
                    tracing::warn!("INPUT_BUFFER_CAPACITY must be 1-65536, using default");
                }
            } else {
                tracing::warn!("Invalid INPUT_BUFFER_CAPACITY '{}', using default", capacity);
            }
        }

        if let Ok(port) = std::env::var("METRICS_PORT") {
            if let Ok(parsed) = port.parse::<u16>() {
                if parsed > 0 {
                    config.metrics_port = parsed;
                } else {
                    tracing::warn!("METRICS_PORT must be > 0, using default");
                }
            } else {
                tracing::warn!("Invalid METRICS_PORT '{}', using default", port);
            }
        }

        if let Ok(entities) = std::env::var("SOAK_ENTITIES") {
            if let Ok(parsed) = entities.parse::<usize>() {
                if parsed > 0 && parsed <= config.max_entities {
                    config.soak_entities = parsed;
                } else {
                    tracing::warn!("SOAK_ENTITIES out of range, using default");
                }
            } else {
                tracing::warn!("Invalid SOAK_ENTITIES '{}', using default", entities);
            }
        }

        config
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.snapshot_rate == 0 || self.tick_rate % self.snapshot_rate != 0 {
            return Err("snapshot_rate must divide tick_rate".to_string());
        }
        if self.max_rewind_ms > crate::game::constants::combat::HISTORY_WINDOW_MS {
            return Err("max_rewind_ms cannot exceed the history window".to_string());
        }
        if self.input_buffer_capacity == 0 {
            return Err("input_buffer_capacity must be at least 1".to_string());
        }
        if self.soak_entities > self.max_entities {
            return Err("soak_entities cannot exceed max_entities".to_string());
        }
        Ok(())
    }
}
