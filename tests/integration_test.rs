use std::path::Path;
use veo3_batch_runner::browser::{Session, SessionPool, SessionState};
use veo3_batch_runner::models::BatchConfig;
use veo3_batch_runner::utils::logging;
use veo3_batch_runner::{App, Config};

#[tokio::test]
#[ignore] // 默认忽略，需要本机有 Chrome 并手动运行：cargo test -- --ignored
async fn test_session_launch_and_heal() {
    logging::init(true);

    let config = Config::from_env();
    let session = Session::new("integration_test", config.session.clone());

    // 懒启动：首次导航才拉起浏览器
    assert_eq!(session.state().await, SessionState::Unstarted);
    session
        .goto("https://example.com")
        .await
        .expect("导航失败");
    assert!(session.is_alive().await);

    // 软重置后页面可继续使用
    session.soft_reset().await.expect("软重置失败");
    let title = session
        .evaluate("document.title")
        .await
        .expect("执行脚本失败");
    println!("页面标题: {:?}", title);

    session.teardown().await;
    assert_eq!(session.state().await, SessionState::Unstarted);
}

#[tokio::test]
#[ignore]
async fn test_credential_snapshot_roundtrip() {
    logging::init(true);

    let config = Config::from_env();
    let session = Session::new("integration_cred", config.session.clone());

    session
        .goto("https://example.com")
        .await
        .expect("导航失败");
    session
        .snapshot_credentials("example.com")
        .await
        .expect("快照凭据失败");

    // 重建浏览器后再次进入同一域名会回放快照
    session.teardown().await;
    session
        .goto("https://example.com/")
        .await
        .expect("二次导航失败");

    session.teardown().await;
}

#[tokio::test]
#[ignore]
async fn test_pool_isolates_parallel_sessions() {
    logging::init(true);

    let config = Config::from_env();
    let pool = SessionPool::new(config.session.clone());

    let a = pool.acquire("batch_0").await;
    let b = pool.acquire("batch_1").await;

    let (ra, rb) = tokio::join!(a.goto("https://example.com"), b.goto("https://example.com"));
    ra.expect("会话 0 导航失败");
    rb.expect("会话 1 导航失败");

    assert_ne!(a.user_data_dir(), b.user_data_dir());
    pool.shutdown().await;
}

#[tokio::test]
#[ignore]
async fn test_full_batch_from_toml() {
    logging::init(true);

    let config = Config::from_env();

    // 注意：请根据实际情况修改配置文件路径，并保证已配置好 Gemini 凭据
    let batch_path = Path::new("data/batch.toml");
    let batch = BatchConfig::from_path(batch_path).expect("加载批处理配置失败");

    let app = App::initialize(config, batch, false)
        .await
        .expect("初始化失败");
    let summary = app.run().await.expect("运行失败");

    println!(
        "批处理完成: 成功 {}/{}，部分 {}，失败 {}",
        summary.successful, summary.total, summary.partial, summary.failed
    );
    assert!(summary.all_successful(), "批处理应该全部成功");
}
