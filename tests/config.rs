use scheme_simulator::config::{
    ConfigError, ADDRESS_VAR, DEFAULT_ADDRESS, DEFAULT_GRACE_PERIOD, GRACE_PERIOD_VAR,
};
use scheme_simulator::{Config, Error};
use std::time::Duration;

#[test]
fn defaults() {
    let config = Config::default();
    assert_eq!(config.address(), DEFAULT_ADDRESS);
    assert_eq!(config.grace_period(), Duration::from_secs(3));
    assert_eq!(Config::new("").address(), DEFAULT_ADDRESS);
}

#[test]
fn zero_grace_period_uses_default() {
    let config = Config::new("127.0.0.1:9000").with_grace_period(Duration::ZERO);
    assert_eq!(config.grace_period(), DEFAULT_GRACE_PERIOD);

    let config = config.with_grace_period(Duration::from_millis(250));
    assert_eq!(config.grace_period(), Duration::from_millis(250));
    assert_eq!(config.address(), "127.0.0.1:9000");
}

// Environment variables are process-wide, so every case lives in this one test.
#[test]
fn from_env() {
    std::env::remove_var(ADDRESS_VAR);
    std::env::remove_var(GRACE_PERIOD_VAR);
    assert_eq!(Config::from_env().unwrap(), Config::default());

    std::env::set_var(ADDRESS_VAR, "0.0.0.0:7000");
    std::env::set_var(GRACE_PERIOD_VAR, "1500");
    let config = Config::from_env().unwrap();
    assert_eq!(config.address(), "0.0.0.0:7000");
    assert_eq!(config.grace_period(), Duration::from_millis(1500));

    std::env::set_var(GRACE_PERIOD_VAR, "soon");
    let err = Config::from_env().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidGracePeriod { ref value, .. } if value == "soon"));
    assert!(Error::from(err).to_string().contains("soon"));

    std::env::remove_var(ADDRESS_VAR);
    std::env::remove_var(GRACE_PERIOD_VAR);
}
