use anyhow::{Result, anyhow};

use crate::config::ConnectionSettings;

pub fn build_config(settings: &ConnectionSettings) -> Result<tiberius::Config> {
    let mut config = tiberius::Config::new();
    config.host(&settings.server);
    config.port(settings.port);
    config.database(&settings.database);
    config.application_name("dbdeploy");

    match (&settings.user, &settings.password) {
        (Some(user), Some(pass)) => {
            config.authentication(tiberius::AuthMethod::sql_server(user, pass));
        }
        (Some(user), None) => {
            return Err(anyhow!(
                "Password is required for SQL authentication (user: {})",
                user
            ));
        }
        _ => {}
    }

    if settings.encrypt {
        config.encryption(tiberius::EncryptionLevel::Required);
    } else {
        config.encryption(tiberius::EncryptionLevel::NotSupported);
    }

    if settings.trust_cert {
        config.trust_cert();
    }

    Ok(config)
}

/// Human-readable target without the password, e.g. `deployer@db.example:1444/appdb`.
pub fn describe(settings: &ConnectionSettings) -> String {
    let user = settings
        .user
        .as_deref()
        .map(|user| format!("{}@", user))
        .unwrap_or_default();
    format!(
        "{}{}:{}/{}",
        user, settings.server, settings.port, settings.database
    )
}
