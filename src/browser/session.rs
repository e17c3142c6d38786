//! 自动化会话 - 基础设施层
//!
//! 一个 Session 对应一个隔离的浏览器实例（独立 user-data-dir、独立凭据），
//! 由且仅由一个工作流持有。懒启动：创建 Session 不产生任何副作用，
//! 首次页面操作时才真正拉起浏览器。
//!
//! 每个操作都先做活性探测，发现页面/浏览器已被撕毁则透明重建并把该操作
//! 重试一次——对调用方不可见的自愈。

use crate::browser::credentials::{domain_of, CredentialStore};
use crate::config::SessionConfig;
use crate::error::{AppError, AppResult, BrowserError};
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value as JsonValue;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// 会话生命周期
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// 尚未启动（惰性）
    Unstarted,
    /// 浏览器与页面均在线
    Live,
    /// 已检测到撕毁，待重建
    Dead,
}

struct SessionInner {
    state: SessionState,
    browser: Option<Browser>,
    page: Option<Page>,
    handler_task: Option<JoinHandle<()>>,
    /// 本次浏览器生命周期内已回放过凭据的域名
    seeded_domains: HashSet<String>,
}

/// 自动化会话
///
/// 内部 Arc，可廉价 clone；但并发来自多个 Session，绝不跨工作流共享同一个。
#[derive(Clone)]
pub struct Session {
    id: String,
    config: SessionConfig,
    credentials: CredentialStore,
    inner: Arc<Mutex<SessionInner>>,
}

impl Session {
    /// 创建会话（不启动浏览器）
    pub fn new(id: impl Into<String>, config: SessionConfig) -> Self {
        let id = id.into();
        let credentials = CredentialStore::new(&config.profiles_dir, &id);
        Self {
            id,
            config,
            credentials,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Unstarted,
                browser: None,
                page: None,
                handler_task: None,
                seeded_domains: HashSet::new(),
            })),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// 单次界面操作（等元素等）的超时
    pub fn op_timeout(&self) -> Duration {
        self.config.op_timeout
    }

    /// 本会话独立的 user-data-dir
    pub fn user_data_dir(&self) -> String {
        format!("{}/{}", self.config.user_data_root, self.id)
    }

    /// 当前生命周期状态
    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    /// 活性探测：页面存在且能执行脚本
    pub async fn is_alive(&self) -> bool {
        let inner = self.inner.lock().await;
        match &inner.page {
            Some(page) => probe(page).await,
            None => false,
        }
    }

    // ========== 生命周期 ==========

    /// 确保浏览器与页面在线（内部，持锁调用）
    ///
    /// 启动失败直接向上传播——对持有者是致命的，重试属于重试控制器的职责。
    async fn ensure_live(&self, inner: &mut SessionInner) -> AppResult<()> {
        if inner.state == SessionState::Live {
            if let Some(page) = &inner.page {
                if probe(page).await {
                    return Ok(());
                }
            }
            warn!("[会话 {}] ⚠️ 页面已被撕毁，重建浏览器...", self.id);
            inner.state = SessionState::Dead;
        }

        self.teardown_inner(inner, true).await;

        info!("[会话 {}] 🚀 启动浏览器...", self.id);
        let user_data_dir = self.user_data_dir();
        std::fs::create_dir_all(&user_data_dir).map_err(|e| {
            AppError::Browser(BrowserError::ConfigurationFailed {
                source: Box::new(e),
            })
        })?;

        let mut builder = BrowserConfig::builder()
            .user_data_dir(Path::new(&user_data_dir))
            .args(vec![
                "--disable-gpu",           // 无头模式下禁用 GPU
                "--no-sandbox",            // 禁用沙盒，防止权限问题导致的崩溃
                "--disable-dev-shm-usage", // 防止共享内存不足
            ]);
        if self.config.headless {
            builder = builder.new_headless_mode();
        } else {
            builder = builder.with_head();
        }
        if let Some(exe) = &self.config.chrome_executable {
            builder = builder.chrome_executable(Path::new(exe));
        }
        let browser_config = builder.build().map_err(|e| {
            AppError::Browser(BrowserError::ConfigurationFailed {
                source: Box::new(std::io::Error::new(std::io::ErrorKind::Other, e)),
            })
        })?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| AppError::launch_failed(&self.id, e))?;

        // 在后台处理浏览器事件
        let handler_task = tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        });

        // 添加短暂延迟以等待浏览器状态同步
        sleep(Duration::from_millis(300)).await;

        let page = browser.new_page("about:blank").await.map_err(|e| {
            AppError::Browser(BrowserError::PageCreationFailed {
                source: Box::new(e),
            })
        })?;

        inner.browser = Some(browser);
        inner.page = Some(page);
        inner.handler_task = Some(handler_task);
        inner.seeded_domains.clear();
        inner.state = SessionState::Live;
        debug!("[会话 {}] 浏览器已就绪", self.id);
        Ok(())
    }

    /// 软重置：只换页面，浏览器与凭据保留（阶段之间的廉价重置）
    pub async fn soft_reset(&self) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Live {
            return Ok(());
        }
        debug!("[会话 {}] 软重置：更换页面", self.id);
        if let Some(page) = inner.page.take() {
            let _ = page.close().await;
        }
        if let Some(browser) = &inner.browser {
            let page = browser.new_page("about:blank").await.map_err(|e| {
                AppError::Browser(BrowserError::PageCreationFailed {
                    source: Box::new(e),
                })
            })?;
            inner.page = Some(page);
        } else {
            inner.state = SessionState::Unstarted;
        }
        Ok(())
    }

    /// 全量销毁：关闭页面与浏览器，回到未启动状态
    pub async fn teardown(&self) {
        let mut inner = self.inner.lock().await;
        self.teardown_inner(&mut inner, false).await;
    }

    async fn teardown_inner(&self, inner: &mut SessionInner, silent: bool) {
        if !silent && inner.browser.is_some() {
            info!("[会话 {}] 🛑 关闭浏览器", self.id);
        }
        inner.page = None;
        if let Some(mut browser) = inner.browser.take() {
            let _ = browser.close().await;
            let _ = browser.wait().await;
        }
        if let Some(task) = inner.handler_task.take() {
            task.abort();
        }
        inner.seeded_domains.clear();
        inner.state = SessionState::Unstarted;
    }

    /// 硬重置：清除某域名的凭据并全量销毁，排除"中毒"会话
    pub async fn hard_reset(&self, domain: &str) -> AppResult<()> {
        warn!("[会话 {}] 🔄 硬重置：清除 {} 的凭据", self.id, domain);
        {
            let inner = self.inner.lock().await;
            if let Some(page) = &inner.page {
                let _ = page.execute(ClearBrowserCookiesParams::default()).await;
            }
        }
        self.credentials.clear(domain)?;
        self.teardown().await;
        Ok(())
    }

    // ========== 页面操作（带自愈） ==========

    /// 导航到 URL，首次进入某域名前回放凭据快照
    pub async fn goto(&self, url: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_live(&mut inner).await?;
        self.seed_domain(&mut inner, url).await;

        let page = live_page(&inner)?;
        if let Err(first) = page.goto(url).await {
            warn!("[会话 {}] ⚠️ 导航失败，自愈后重试一次: {}", self.id, first);
            inner.state = SessionState::Dead;
            self.ensure_live(&mut inner).await?;
            self.seed_domain(&mut inner, url).await;
            let page = live_page(&inner)?;
            page.goto(url).await.map_err(|e| {
                AppError::Browser(BrowserError::NavigationFailed {
                    url: url.to_string(),
                    source: Box::new(e),
                })
            })?;
        }
        sleep(Duration::from_millis(500)).await;
        Ok(())
    }

    async fn seed_domain(&self, inner: &mut SessionInner, url: &str) {
        let domain = domain_of(url);
        if inner.seeded_domains.contains(&domain) {
            return;
        }
        if let Some(cookies) = self.credentials.load(&domain) {
            if let Some(page) = &inner.page {
                match page.set_cookies(cookies).await {
                    Ok(_) => info!("[会话 {}] ✓ 已回放 {} 的凭据快照", self.id, domain),
                    Err(e) => warn!("[会话 {}] ⚠️ 回放凭据失败: {}", self.id, e),
                }
            }
        }
        inner.seeded_domains.insert(domain);
    }

    /// 执行 JS 并返回 JSON 结果
    pub async fn evaluate(&self, js: impl Into<String>) -> AppResult<JsonValue> {
        let js = js.into();
        let mut inner = self.inner.lock().await;
        self.ensure_live(&mut inner).await?;

        let page = live_page(&inner)?;
        match eval_on(&page, &js).await {
            Ok(v) => Ok(v),
            Err(first) => {
                warn!("[会话 {}] ⚠️ 脚本执行失败，自愈后重试一次: {}", self.id, first);
                inner.state = SessionState::Dead;
                self.ensure_live(&mut inner).await?;
                let page = live_page(&inner)?;
                eval_on(&page, &js).await
            }
        }
    }

    /// 点击元素
    pub async fn click(&self, selector: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_live(&mut inner).await?;

        let page = live_page(&inner)?;
        if let Err(first) = click_on(&page, selector).await {
            warn!("[会话 {}] ⚠️ 点击失败，自愈后重试一次: {}", self.id, first);
            inner.state = SessionState::Dead;
            self.ensure_live(&mut inner).await?;
            let page = live_page(&inner)?;
            click_on(&page, selector).await?;
        }
        Ok(())
    }

    /// 清空并填入文本
    pub async fn fill(&self, selector: &str, text: &str) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_live(&mut inner).await?;

        let page = live_page(&inner)?;
        if let Err(first) = fill_on(&page, selector, text).await {
            warn!("[会话 {}] ⚠️ 填写失败，自愈后重试一次: {}", self.id, first);
            inner.state = SessionState::Dead;
            self.ensure_live(&mut inner).await?;
            let page = live_page(&inner)?;
            fill_on(&page, selector, text).await?;
        }
        Ok(())
    }

    /// 轮询等待元素出现
    pub async fn wait_for_selector(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> AppResult<()> {
        let started = Instant::now();
        loop {
            let found: bool = self
                .evaluate(format!(
                    "document.querySelector({:?}) !== null",
                    selector
                ))
                .await?
                .as_bool()
                .unwrap_or(false);
            if found {
                return Ok(());
            }
            if started.elapsed() >= timeout {
                return Err(AppError::Browser(BrowserError::WaitTimeout {
                    selector: selector.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                }));
            }
            sleep(Duration::from_millis(500)).await;
        }
    }

    /// 向文件输入框上传附件
    pub async fn upload_files(&self, selector: &str, paths: &[String]) -> AppResult<()> {
        let mut inner = self.inner.lock().await;
        self.ensure_live(&mut inner).await?;

        let page = live_page(&inner)?;
        let element = page.find_element(selector).await?;
        let params = SetFileInputFilesParams::builder()
            .files(paths.to_vec())
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(|e| AppError::Other(format!("构建文件上传参数失败: {}", e)))?;
        page.execute(params).await?;
        Ok(())
    }

    /// 当前页面 URL（用于记录远程会话链接）
    pub async fn current_url(&self) -> AppResult<Option<String>> {
        let inner = self.inner.lock().await;
        match &inner.page {
            Some(page) => Ok(page.url().await?),
            None => Ok(None),
        }
    }

    /// 把当前 cookies 快照为某域名的凭据（登录后/检查点调用）
    pub async fn snapshot_credentials(&self, domain: &str) -> AppResult<()> {
        let inner = self.inner.lock().await;
        if let Some(page) = &inner.page {
            let cookies = page.get_cookies().await?;
            self.credentials.save(domain, &cookies)?;
        }
        Ok(())
    }
}

// ========== 页面级原语（不带自愈，供上面包裹） ==========

/// ensure_live 成功后取页面；取不到说明状态机被破坏
fn live_page(inner: &SessionInner) -> AppResult<Page> {
    inner
        .page
        .clone()
        .ok_or_else(|| AppError::Other("会话已就绪但页面缺失".to_string()))
}

async fn probe(page: &Page) -> bool {
    matches!(page.evaluate("1 + 1").await, Ok(_))
}

async fn eval_on(page: &Page, js: &str) -> AppResult<JsonValue> {
    let result = page.evaluate(js.to_string()).await?;
    let value = result.into_value().unwrap_or(JsonValue::Null);
    Ok(value)
}

async fn click_on(page: &Page, selector: &str) -> AppResult<()> {
    let element = page.find_element(selector).await?;
    element.click().await?;
    Ok(())
}

async fn fill_on(page: &Page, selector: &str, text: &str) -> AppResult<()> {
    let element = page.find_element(selector).await?;
    element.click().await?;
    // 先清空再输入，富文本编辑器也适用
    page.evaluate(format!(
        "(() => {{ const el = document.querySelector({:?}); if (el) {{ if ('value' in el) el.value = ''; else el.textContent = ''; }} }})()",
        selector
    ))
    .await?;
    element.type_str(text).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(root: &std::path::Path) -> SessionConfig {
        SessionConfig {
            headless: true,
            op_timeout: Duration::from_secs(5),
            profiles_dir: root.join("profiles").display().to_string(),
            user_data_root: root.join("browsers").display().to_string(),
            chrome_executable: None,
        }
    }

    #[tokio::test]
    async fn test_new_session_is_lazy() {
        let tmp = tempfile::tempdir().unwrap();
        let session = Session::new("batch_0", test_config(tmp.path()));

        assert_eq!(session.state().await, SessionState::Unstarted);
        assert!(!session.is_alive().await);
        // 未启动时销毁/软重置都是无副作用的空操作
        session.soft_reset().await.unwrap();
        session.teardown().await;
        assert_eq!(session.state().await, SessionState::Unstarted);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let tmp = tempfile::tempdir().unwrap();
        let a = Session::new("batch_0", test_config(tmp.path()));
        let b = Session::new("batch_1", test_config(tmp.path()));

        // user-data-dir 与凭据路径都按会话隔离
        assert_ne!(a.user_data_dir(), b.user_data_dir());
        assert_ne!(
            a.credentials().path_for("gemini.google.com"),
            b.credentials().path_for("gemini.google.com")
        );
    }

    #[tokio::test]
    async fn test_hard_reset_clears_credentials_when_unstarted() {
        let tmp = tempfile::tempdir().unwrap();
        let session = Session::new("batch_0", test_config(tmp.path()));

        let path = session.credentials().path_for("gemini.google.com");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "[]").unwrap();

        session.hard_reset("gemini.google.com").await.unwrap();
        assert!(!path.exists());
        assert_eq!(session.state().await, SessionState::Unstarted);
    }
}
