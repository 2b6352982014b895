use ugo::CacheHost;

#[tokio::test]
async fn test_from_env_installs_console_logging() {
    let host = CacheHost::from_env().await.unwrap();

    assert!(tracing::dispatcher::has_been_set());
    host.shutdown().await;

    // A second host leaves the installed subscriber alone.
    let host = CacheHost::from_env().await.unwrap();

    assert!(tracing::dispatcher::has_been_set());
    host.shutdown().await;
}
