use fsumi_web::{mask_key, GatewayConfig};

/// Human-readable configuration diagnostics for the gateway and the scraper.
pub fn render(config: &GatewayConfig, missing_scraper_vars: &[&str]) -> String {
    let mut lines = vec!["Checking server configuration...".to_string(), String::new()];

    match config.api_key.as_deref() {
        None => lines.push("[ERROR] API_KEY is not set".into()),
        Some(raw) => {
            let trimmed = raw.trim();
            if raw != trimmed {
                lines.push("[WARN] API_KEY has leading/trailing whitespace".into());
            }
            lines.push("[OK] API_KEY is set".into());
            lines.push(format!("     Length: {} characters", trimmed.chars().count()));
            lines.push(format!("     Preview: {}", mask_key(trimmed)));
        }
    }

    lines.push(String::new());
    lines.push(format!("[OK] PORT: {}", config.port));
    if config.allowed_origins.is_empty() {
        lines.push("[WARN] ALLOWED_ORIGINS is not set (all origins allowed)".into());
    } else {
        lines.push(format!(
            "[OK] ALLOWED_ORIGINS: {}",
            config.allowed_origins.join(", ")
        ));
    }

    lines.push(String::new());
    lines.push(match config.yahoo_email.as_deref() {
        Some(email) => format!("[OK] YAHOO_EMAIL: {email}"),
        None => "[ERROR] YAHOO_EMAIL is not set".into(),
    });
    match config.yahoo_app_password.as_deref() {
        Some(password) => {
            lines.push("[OK] YAHOO_APP_PASSWORD is set".into());
            lines.push(format!("     Length: {} characters", password.chars().count()));
        }
        None => lines.push("[ERROR] YAHOO_APP_PASSWORD is not set".into()),
    }

    lines.push(String::new());
    lines.push(format!("[OK] APP_ENV: {}", config.app_env));
    if missing_scraper_vars.is_empty() {
        lines.push("[OK] news scraper credentials are complete".into());
    } else {
        lines.push(format!(
            "[WARN] news scraper will not run; missing: {}",
            missing_scraper_vars.join(", ")
        ));
    }

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_masked_key_and_missing_pieces() {
        let config = GatewayConfig {
            api_key: Some(" abcdefghijkl ".into()),
            port: 3001,
            app_env: "production".into(),
            ..Default::default()
        };
        let text = render(&config, &["GOOGLE_PRIVATE_KEY"]);

        assert!(text.contains("[WARN] API_KEY has leading/trailing whitespace"));
        assert!(text.contains("Length: 12 characters"));
        assert!(text.contains("Preview: abcd...ijkl"));
        assert!(text.contains("[WARN] ALLOWED_ORIGINS is not set"));
        assert!(text.contains("[ERROR] YAHOO_EMAIL is not set"));
        assert!(text.contains("[OK] APP_ENV: production"));
        assert!(text.contains("missing: GOOGLE_PRIVATE_KEY"));
        assert!(!text.contains("abcdefghijkl"));
    }

    #[test]
    fn complete_configuration_reports_every_section() {
        let config = GatewayConfig {
            api_key: Some("csc-test-key-0123456789".into()),
            port: 3001,
            allowed_origins: vec!["https://csc.fs-umi.ac.ma".into()],
            yahoo_email: Some("csc@yahoo.com".into()),
            yahoo_app_password: Some("app-password".into()),
            app_env: "development".into(),
            ..Default::default()
        };
        let text = render(&config, &[]);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "Checking server configuration...");
        assert!(lines.contains(&"[OK] ALLOWED_ORIGINS: https://csc.fs-umi.ac.ma"));
        assert!(lines.contains(&"[OK] YAHOO_EMAIL: csc@yahoo.com"));
        assert!(lines.contains(&"     Length: 12 characters"));
        assert!(text.ends_with("[OK] news scraper credentials are complete\n"));
        assert!(!text.contains("[ERROR]"));
        assert!(!text.contains("[WARN]"));
    }
}
