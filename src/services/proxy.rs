use super::GlobalServices;
use crate::config::GlobalService;
use crate::error::{Error, Result};
use std::net::{SocketAddr, TcpStream};
use std::time::Duration;
use tracing::{debug, info};

const VERSION_FILE: &str = "/version.conf";

/// Nothing accepts connections on `port` on localhost.
pub fn port_is_free(port: u16) -> bool {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_err()
}

/// The nginx directive advertising this tool and its version.
pub fn version_header(version: &str) -> String {
    format!(
        "add_header X-Powered-By \"{} v{}\";",
        env!("CARGO_PKG_NAME"),
        version
    )
}

impl GlobalServices<'_> {
    /// Make sure the proxy runs on the configured ports.
    ///
    /// A running proxy must already publish the configured ports. Otherwise
    /// both ports have to be free before anything is created. Returns
    /// whether the proxy was started by this call.
    pub fn proxy_check(&self) -> Result<bool> {
        let (http, https) = self.settings.proxy_ports();
        let container = self.container(GlobalService::NginxProxy);

        if self.docker.is_running(&container)? {
            let ports = self.docker.inspect_ports(&container)?;
            let running_http = ports.get("80/tcp").cloned().unwrap_or_default();
            let running_https = ports.get("443/tcp").cloned().unwrap_or_default();
            if running_http != http.to_string() || running_https != https.to_string() {
                return Err(Error::PortMismatch {
                    running: format!("{}/{}", running_http, running_https),
                    configured: format!("{}/{}", http, https),
                });
            }
            return Ok(false);
        }

        if !(port_is_free(http) && port_is_free(https)) {
            return Err(Error::PortsOccupied { http, https });
        }

        self.ensure_compose_file()?;
        self.boot_global_networks()?;
        self.up(&[GlobalService::NginxProxy])?;
        self.set_proxy_version_conf()?;
        Ok(true)
    }

    /// Write the version header into the running proxy and reload nginx.
    pub fn set_proxy_version_conf(&self) -> Result<()> {
        let container = self.container(GlobalService::NginxProxy);
        if !self.docker.is_running(&container)? {
            debug!("Proxy not running, skipping version header");
            return Ok(());
        }

        let dir = self.settings.service_dir();
        let service = GlobalService::NginxProxy.compose_service();
        let script = format!(
            "echo '{}' > {}",
            version_header(&self.settings.version),
            VERSION_FILE
        );
        if self.docker.compose_exec(&dir, &service, &script)? {
            info!("Set proxy version header");
            self.docker
                .compose_exec(&dir, &service, "nginx -t && nginx -s reload")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GlobalNames, Settings};
    use crate::docker::DockerClient;
    use crate::state::StateStore;
    use crate::testing::ScriptedRunner;

    #[test]
    fn header_names_tool_and_version() {
        assert_eq!(
            version_header("1.2.3"),
            "add_header X-Powered-By \"global-services v1.2.3\";"
        );
    }

    #[test]
    fn running_proxy_on_other_ports_is_rejected() {
        let runner = ScriptedRunner::new();
        runner.running("services_global-nginx-proxy_1");
        runner.stdout(
            "json .NetworkSettings.Ports",
            r#"{"80/tcp":[{"HostPort":"8080"}],"443/tcp":[{"HostPort":"443"}]}"#,
        );
        let names = GlobalNames::default();
        let docker = DockerClient::new(&runner, &names);
        let store = StateStore::open_in_memory().unwrap();
        let settings = Settings::with_root("/srv");
        let services = GlobalServices::new(&settings, &store, &docker);

        match services.proxy_check() {
            Err(Error::PortMismatch { running, configured }) => {
                assert_eq!(running, "8080/443");
                assert_eq!(configured, "80/443");
            }
            other => panic!("expected port mismatch, got {:?}", other),
        }
        assert!(!runner.ran("up -d"));
    }

    #[test]
    fn running_proxy_on_configured_ports_is_left_alone() {
        let runner = ScriptedRunner::new();
        runner.running("services_global-nginx-proxy_1");
        runner.stdout(
            "json .NetworkSettings.Ports",
            r#"{"80/tcp":[{"HostPort":"80"}],"443/tcp":[{"HostPort":"443"}]}"#,
        );
        let names = GlobalNames::default();
        let docker = DockerClient::new(&runner, &names);
        let store = StateStore::open_in_memory().unwrap();
        let settings = Settings::with_root("/srv");
        let services = GlobalServices::new(&settings, &store, &docker);

        assert!(!services.proxy_check().unwrap());
    }

    #[test]
    fn occupied_port_is_detected() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(!port_is_free(port));
    }
}
