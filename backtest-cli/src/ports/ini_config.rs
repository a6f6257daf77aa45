/// ports/ini_config.rs — INI-backed ConfigPort adapter
use backtest_core::ports::ConfigPort;
use configparser::ini::Ini;
use tracing::warn;

pub struct IniConfigPort {
    ini: Ini,
}

impl IniConfigPort {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let mut ini = Ini::new();
        ini.load(path).map_err(|e| anyhow::anyhow!("failed to load config {path}: {e}"))?;
        Ok(Self { ini })
    }
}

impl ConfigPort for IniConfigPort {
    fn get_string(&self, section: &str, key: &str, default: &str) -> String {
        self.ini.get(section, key).unwrap_or_else(|| default.to_string())
    }

    fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
        match self.ini.get(section, key) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!(section, key, value = %v, "config value is not an integer, using default");
                default
            }),
            None => default,
        }
    }

    fn get_float(&self, section: &str, key: &str, default: f64) -> f64 {
        match self.ini.get(section, key) {
            Some(v) => v.parse().unwrap_or_else(|_| {
                warn!(section, key, value = %v, "config value is not a float, using default");
                default
            }),
            None => default,
        }
    }

    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        self.ini.getbool(section, key).ok().flatten().unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_ini(contents: &str) -> String {
        let path = std::env::temp_dir().join(format!("backtest_cli_test_{}.ini", std::process::id()));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[test]
    fn reads_typed_values_with_fallback_defaults() {
        let path = write_temp_ini(
            "[backtest]\ninitial_capital = 50000\ncommission_pct = 0.1\nallow_shorting = true\nexchange = ASX\n",
        );
        let port = IniConfigPort::load(&path).unwrap();
        assert_eq!(port.get_float("backtest", "initial_capital", 100_000.0), 50_000.0);
        assert_eq!(port.get_float("backtest", "commission_pct", 0.0), 0.1);
        assert!(port.get_bool("backtest", "allow_shorting", false));
        assert_eq!(port.get_string("backtest", "exchange", "NONE"), "ASX");
        assert_eq!(port.get_int("backtest", "max_positions", 5), 5);
        std::fs::remove_file(path).ok();
    }
}
