//! Playwright browser automation
//!
//! [`PlaywrightPage`] runs a small Node driver that owns a single page and
//! answers line-delimited JSON commands on stdin/stdout. Every command carries
//! an id, so several waits can be in flight at once and a reply that nobody
//! awaits any more is simply dropped.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::browser::BrowserPage;
use crate::error::{E2eError, E2eResult};

/// Slack on top of a command's own timeout before the caller stops waiting
const REPLY_GRACE: Duration = Duration::from_secs(1);

/// How long to wait for the driver to exit after a close
const EXIT_TIMEOUT: Duration = Duration::from_secs(5);

const DRIVER_SCRIPT: &str = r#"
const readline = require('readline');

const [engine, headless, width, height] = process.argv.slice(2);
const playwright = require(require.resolve('playwright', { paths: [process.cwd(), __dirname] }));

const send = (msg) => process.stdout.write(JSON.stringify(msg) + '\n');

(async () => {
  let browser;
  let page;
  try {
    browser = await playwright[engine].launch({ headless: headless === 'true' });
    page = await browser.newPage({ viewport: { width: Number(width), height: Number(height) } });
  } catch (error) {
    send({ ready: false, error: error.message });
    process.exit(1);
  }
  send({ ready: true });

  const handlers = {
    goto: (c) => page.goto(c.url, { waitUntil: 'networkidle', timeout: c.timeout_ms }).then(() => null),
    wait_for: (c) => page.locator(c.selector).first().waitFor({ state: 'visible', timeout: c.timeout_ms }).then(() => null),
    fill: (c) => page.locator(c.selector).first().fill(c.value).then(() => null),
    click: (c) => page.locator(c.selector).first().click().then(() => null),
    inner_text: (c) => page.locator(c.selector).first().innerText(),
    close: async () => { await page.close(); await browser.close(); return null; },
  };

  const rl = readline.createInterface({ input: process.stdin });
  rl.on('line', (line) => {
    let cmd;
    try {
      cmd = JSON.parse(line);
    } catch (error) {
      return;
    }
    const handler = handlers[cmd.op];
    if (!handler) {
      send({ id: cmd.id, ok: false, timeout: false, error: 'unknown op ' + cmd.op });
      return;
    }
    handler(cmd).then(
      (value) => {
        send({ id: cmd.id, ok: true, value });
        if (cmd.op === 'close') process.exit(0);
      },
      (error) => send({
        id: cmd.id,
        ok: false,
        timeout: !!error && error.name === 'TimeoutError',
        error: (error && error.message) || String(error),
      }),
    );
  });
  rl.on('close', async () => {
    try { await browser.close(); } catch (_) {}
    process.exit(0);
  });
})();
"#;

/// Browser engine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Directory `playwright` is resolved from (its `node_modules`)
    pub working_dir: PathBuf,
    pub node_binary: PathBuf,
    pub launch_timeout: Duration,
    /// Reply deadline for commands without a timeout of their own
    /// (fill, click, inner_text, close)
    pub action_timeout: Duration,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1280,
            viewport_height: 720,
            working_dir: PathBuf::from("."),
            node_binary: PathBuf::from("node"),
            launch_timeout: Duration::from_secs(30),
            action_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum DriverCommand<'a> {
    Goto { url: &'a str, timeout_ms: u64 },
    WaitFor { selector: &'a str, timeout_ms: u64 },
    Fill { selector: &'a str, value: &'a str },
    Click { selector: &'a str },
    InnerText { selector: &'a str },
    Close,
}

impl DriverCommand<'_> {
    fn describe(&self) -> String {
        match self {
            DriverCommand::Goto { url, .. } => format!("goto:{}", url),
            DriverCommand::WaitFor { selector, .. } => format!("wait:{}", selector),
            DriverCommand::Fill { selector, .. } => format!("fill:{}", selector),
            DriverCommand::Click { selector } => format!("click:{}", selector),
            DriverCommand::InnerText { selector } => format!("inner_text:{}", selector),
            DriverCommand::Close => "close".to_string(),
        }
    }

    fn timeout(&self) -> Option<Duration> {
        match self {
            DriverCommand::Goto { timeout_ms, .. } | DriverCommand::WaitFor { timeout_ms, .. } => {
                Some(Duration::from_millis(*timeout_ms))
            }
            _ => None,
        }
    }

    /// How long the caller waits for a reply before giving up on the driver.
    fn deadline(&self, action_timeout: Duration) -> Duration {
        self.timeout()
            .map(|t| t + REPLY_GRACE)
            .unwrap_or(action_timeout)
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    id: u64,
    #[serde(flatten)]
    command: &'a DriverCommand<'a>,
}

#[derive(Debug, Deserialize)]
struct DriverReply {
    id: u64,
    ok: bool,
    #[serde(default)]
    value: Option<serde_json::Value>,
    #[serde(default)]
    timeout: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReadyLine {
    ready: bool,
    #[serde(default)]
    error: Option<String>,
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<DriverReply>>>>;

/// One Playwright page driven through a Node subprocess
pub struct PlaywrightPage {
    child: tokio::sync::Mutex<Child>,
    stdin: tokio::sync::Mutex<ChildStdin>,
    pending: Pending,
    next_id: AtomicU64,
    action_timeout: Duration,
    reader: JoinHandle<()>,
    // Keeps the driver script on disk for the lifetime of the page.
    _script_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    /// Start the driver and open a new page.
    pub async fn launch(config: &PlaywrightConfig) -> E2eResult<Self> {
        Self::check_playwright_installed(config).await?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("aaft-driver.js");
        tokio::fs::write(&script_path, DRIVER_SCRIPT).await?;

        info!(
            "Launching {} (headless: {})",
            config.browser.as_str(),
            config.headless
        );

        let mut child = Command::new(&config.node_binary)
            .arg(&script_path)
            .arg(config.browser.as_str())
            .arg(config.headless.to_string())
            .arg(config.viewport_width.to_string())
            .arg(config.viewport_height.to_string())
            .current_dir(&config.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                E2eError::DriverStartup(format!(
                    "failed to spawn {}: {}",
                    config.node_binary.display(),
                    e
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| E2eError::DriverStartup("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| E2eError::DriverStartup("driver stdout unavailable".to_string()))?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[playwright] {}", line);
                }
            });
        }

        let mut lines = BufReader::new(stdout).lines();
        let ready = tokio::time::timeout(config.launch_timeout, lines.next_line())
            .await
            .map_err(|_| E2eError::Timeout {
                target: "browser launch".to_string(),
                after: config.launch_timeout,
            })??;

        match ready.map(|line| serde_json::from_str::<ReadyLine>(&line)) {
            Some(Ok(ReadyLine { ready: true, .. })) => {}
            Some(Ok(ReadyLine { error, .. })) => {
                return Err(E2eError::DriverStartup(
                    error.unwrap_or_else(|| "browser did not start".to_string()),
                ))
            }
            Some(Err(e)) => return Err(E2eError::DriverStartup(format!("bad handshake: {}", e))),
            None => return Err(E2eError::DriverStartup("driver exited during launch".to_string())),
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_replies(lines, pending.clone()));

        Ok(Self {
            child: tokio::sync::Mutex::new(child),
            stdin: tokio::sync::Mutex::new(stdin),
            pending,
            next_id: AtomicU64::new(1),
            action_timeout: config.action_timeout,
            reader,
            _script_dir: script_dir,
        })
    }

    /// Check that node can resolve the playwright package
    async fn check_playwright_installed(config: &PlaywrightConfig) -> E2eResult<()> {
        let status = Command::new(&config.node_binary)
            .args([
                "-e",
                "require.resolve('playwright', { paths: [process.cwd()] })",
            ])
            .current_dir(&config.working_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(E2eError::PlaywrightNotFound),
        }
    }

    async fn request(&self, command: DriverCommand<'_>) -> E2eResult<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let description = command.describe();
        debug!("Driver command #{}: {}", id, description);

        let mut line = serde_json::to_string(&Envelope { id, command: &command })?;
        line.push('\n');

        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);

        let deadline = command.deadline(self.action_timeout);
        let exchange = async {
            {
                let mut stdin = self.stdin.lock().await;
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await?;
            }
            let reply = rx
                .await
                .map_err(|_| E2eError::DriverExited(description.clone()))?;
            Ok::<DriverReply, E2eError>(reply)
        };

        let answered = tokio::time::timeout(deadline, exchange).await;
        let reply = match answered {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                self.pending.lock().remove(&id);
                return Err(e);
            }
            Err(_) => {
                self.pending.lock().remove(&id);
                warn!(
                    "Driver did not answer #{} ({}) within {} ms",
                    id,
                    description,
                    deadline.as_millis()
                );
                return Err(E2eError::Timeout {
                    target: description,
                    after: deadline,
                });
            }
        };

        if reply.ok {
            return Ok(reply.value.unwrap_or(serde_json::Value::Null));
        }

        let message = reply.error.unwrap_or_else(|| "unknown driver error".to_string());
        match (reply.timeout, command.timeout()) {
            (true, Some(after)) => Err(E2eError::Timeout {
                target: description,
                after,
            }),
            _ => Err(E2eError::Playwright(message)),
        }
    }
}

/// Route replies to whoever is still waiting for them.
async fn read_replies(mut lines: Lines<BufReader<ChildStdout>>, pending: Pending) {
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<DriverReply>(&line) {
                Ok(reply) => {
                    let waiter = pending.lock().remove(&reply.id);
                    match waiter {
                        Some(tx) => {
                            // The receiver is gone when a raced wait lost.
                            let _ = tx.send(reply);
                        }
                        None => debug!("Dropping reply for unknown command #{}", reply.id),
                    }
                }
                Err(e) => warn!("Unparseable driver output {:?}: {}", line, e),
            },
            Ok(None) => break,
            Err(e) => {
                warn!("Driver stdout error: {}", e);
                break;
            }
        }
    }
    // Dropping the senders wakes every remaining caller with DriverExited.
    pending.lock().clear();
}

#[async_trait]
impl BrowserPage for PlaywrightPage {
    async fn goto(&self, url: &str, timeout: Duration) -> E2eResult<()> {
        self.request(DriverCommand::Goto {
            url,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
        .map(|_| ())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> E2eResult<()> {
        self.request(DriverCommand::WaitFor {
            selector,
            timeout_ms: timeout.as_millis() as u64,
        })
        .await
        .map(|_| ())
    }

    async fn fill(&self, selector: &str, value: &str) -> E2eResult<()> {
        self.request(DriverCommand::Fill { selector, value })
            .await
            .map(|_| ())
    }

    async fn click(&self, selector: &str) -> E2eResult<()> {
        self.request(DriverCommand::Click { selector })
            .await
            .map(|_| ())
    }

    async fn inner_text(&self, selector: &str) -> E2eResult<String> {
        let value = self.request(DriverCommand::InnerText { selector }).await?;
        match value {
            serde_json::Value::String(text) => Ok(text),
            other => Err(E2eError::Playwright(format!(
                "innerText returned {} for {}",
                other, selector
            ))),
        }
    }

    async fn close(&self) -> E2eResult<()> {
        let closed = self.request(DriverCommand::Close).await.map(|_| ());

        let mut child = self.child.lock().await;
        if let Err(e) = &closed {
            warn!("Playwright driver failed to close the browser ({}), killing it", e);
            if let Err(e) = child.kill().await {
                warn!("Failed to kill Playwright driver: {}", e);
            }
        } else {
            match tokio::time::timeout(EXIT_TIMEOUT, child.wait()).await {
                Ok(Ok(status)) => debug!("Playwright driver exited with {}", status),
                Ok(Err(e)) => warn!("Failed to wait for Playwright driver: {}", e),
                Err(_) => {
                    warn!("Playwright driver did not exit, killing it");
                    let _ = child.kill().await;
                }
            }
        }
        self.reader.abort();

        closed
    }
}
