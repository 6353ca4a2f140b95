/// Server configuration for HTTP server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub workers: usize,
    pub read_timeout_secs: u64,
    pub write_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl ServerConfig {
    pub fn new(
        host: String,
        port: u16,
        read_timeout_secs: u64,
        write_timeout_secs: u64,
        idle_timeout_secs: u64,
    ) -> Self {
        Self {
            host,
            port,
            workers: num_cpus::get() * 2, // 2x CPU cores for I/O-bound workload
            read_timeout_secs,
            write_timeout_secs,
            idle_timeout_secs,
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
