//! Unit tests for `AppError` display format and conversions.

use attention_alert::AppError;

#[test]
fn display_is_prefixed_by_kind() {
    let cases = [
        (AppError::Config("bad".into()), "config: bad"),
        (AppError::Db("locked".into()), "db: locked"),
        (AppError::Backend("no speaker".into()), "backend: no speaker"),
        (AppError::Ipc("closed".into()), "ipc: closed"),
        (AppError::Io("denied".into()), "io: denied"),
        (AppError::Process("killed".into()), "process: killed"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn messages_have_no_trailing_period() {
    let err = AppError::Backend("webhook rejected".into());
    let s = err.to_string();
    assert!(!s.ends_with('.'), "error message must not end with a period: {s}");
}

#[test]
fn io_error_converts_to_io_variant() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg.contains("no such file")));
}

#[test]
fn toml_error_converts_to_config_variant() {
    let err: AppError = toml::from_str::<toml::Table>("key = ").unwrap_err().into();
    assert!(err.to_string().starts_with("config: invalid config"));
}

#[test]
fn sqlx_error_converts_to_db_variant() {
    let err: AppError = sqlx::Error::RowNotFound.into();
    assert!(matches!(err, AppError::Db(_)));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Ipc("x".into()));
}
