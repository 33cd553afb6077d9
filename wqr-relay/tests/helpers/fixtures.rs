//! Configuration and archive fixtures

use std::io::{Cursor, Write};
use std::path::Path;
use wqr_common::config::{env_keys, ConfigOverrides, RelayConfig, TomlConfig};

/// Remove every variable the relay reads so TOML values apply
pub fn clear_env() {
    for key in [
        env_keys::PORTAL_URL,
        env_keys::PORTAL_USERNAME,
        env_keys::PORTAL_PASSWORD,
        env_keys::DOWNLOAD_PATH,
        env_keys::WEBDRIVER_URL,
        env_keys::HEADLESS,
        env_keys::CONFIG_FILE,
        env_keys::SITE_URL,
        env_keys::FOLDER_PATH,
        env_keys::TENANT_ID,
        env_keys::CLIENT_ID,
        env_keys::CLIENT_SECRET,
        env_keys::EMAIL_SENDER,
        env_keys::EMAIL_TO,
    ] {
        std::env::remove_var(key);
    }
}

/// Complete configuration pointing every endpoint at `base_url`
///
/// Detection waits are zero so fallbacks are checked exactly once.
pub fn relay_config(base_url: &str, download_dir: &Path) -> RelayConfig {
    clear_env();
    let text = format!(
        r#"
[portal]
url = "{base}/portal/login"
username = "labuser"
password = "secret"
settle_delay_ms = 0

[download]
path = '{dir}'

[acquisition]
download_timeout_secs = 0
navigation_timeout_secs = 0
tab_timeout_secs = 0
http_timeout_secs = 5

[store]
site_url = "{base}/sites/WaterLab"
folder_path = "/Reports/Water/"

[graph]
tenant_id = "tenant-1"
client_id = "client-1"
client_secret = "secret-1"
graph_base_url = "{base}/v1.0"
login_base_url = "{base}"

[mail]
sender = "Lab Bot <bot@example.com>"
to = "ops@example.com"
"#,
        base = base_url,
        dir = download_dir.display()
    );
    let toml: TomlConfig = toml::from_str(&text).unwrap();
    let today = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    RelayConfig::resolve(toml, ConfigOverrides::default(), today).unwrap()
}

/// In-memory zip archive
pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = zip::ZipWriter::new(&mut cursor);
        let options = zip::write::FileOptions::default();
        for (name, data) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(data.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }
    cursor.into_inner()
}
