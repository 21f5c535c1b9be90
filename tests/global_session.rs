use ntpq_embed::session::{self, QueryError, ADAPTER_ERROR};

/// The process-wide entry points share one session; kept in a single test
/// so ordering within this binary is fixed.
#[test]
fn test_process_wide_facade() {
    assert!(!session::is_ready());

    let mut out = [0u8; 64];
    assert!(matches!(
        session::execute(&["help"], &mut out),
        Err(QueryError::NotOpen)
    ));
    assert_eq!(session::last_error_code(), ADAPTER_ERROR);

    session::create(1024).unwrap();
    assert!(session::is_ready());
    assert!(matches!(session::create(1024), Err(QueryError::AlreadyOpen)));
    assert_eq!(session::last_error_code(), libc::EEXIST);

    session::execute(&["ntpversion"], &mut out).unwrap();
    assert!(out.starts_with(b"NTP version being claimed is 2\n"));

    assert!(session::execute(&["bogus"], &mut out).is_err());
    assert!(session::last_error_text().contains("bogus"));

    session::destroy();
    assert!(!session::is_ready());

    // Installing after first use hands the session back.
    let spare = ntpq_embed::session::QuerySession::default();
    assert!(session::install(spare).is_err());
}
