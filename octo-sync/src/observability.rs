use tracing_subscriber::EnvFilter;

const QUIET_DEPENDENCIES: &[&str] = &["sqlx", "reqwest", "hyper"];

/// Filter directives for `level`, with `RUST_LOG` directives appended so they take precedence.
pub fn filter_directives(level: &str, rust_log: Option<&str>) -> String {
    let level = level.trim().to_ascii_lowercase();
    let mut directives = vec![
        level.clone(),
        format!("octo_sync={level}"),
        format!("consumption_store={level}"),
    ];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|dep| format!("{dep}=warn")));
    if let Some(extra) = rust_log.map(str::trim).filter(|s| !s.is_empty()) {
        directives.push(extra.to_string());
    }
    directives.join(",")
}

/// `LOG_LEVEL` sets the base level, `RUST_LOG` refines it, `LOG_FORMAT=logfmt` drops colour and multi-field layout.
pub fn init_tracing() {
    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let rust_log = std::env::var("RUST_LOG").ok();

    let filter = EnvFilter::try_new(filter_directives(&level, rust_log.as_deref()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let logfmt = std::env::var("LOG_FORMAT")
        .map(|f| f.eq_ignore_ascii_case("logfmt"))
        .unwrap_or(false);

    if logfmt {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_ansi(false)
            .compact()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dependencies_are_capped_at_warn() {
        let d = filter_directives("DEBUG", None);
        assert!(d.starts_with("debug,octo_sync=debug,"));
        assert!(d.contains("sqlx=warn"));
        assert!(d.contains("hyper=warn"));
        assert!(EnvFilter::try_new(&d).is_ok());
    }

    #[test]
    fn rust_log_directives_come_last() {
        let d = filter_directives("info", Some("sqlx=debug"));
        assert!(d.ends_with(",sqlx=debug"));
    }
}
