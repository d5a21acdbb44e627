//! Render Module
//!
//! 再構築済みのODTを外部のLibreOffice（`soffice`）でPDFなどに変換するモジュール。
//!
//! エンジンは`--headless --convert-to <形式> --outdir <ディレクトリ> <入力>`で起動され、
//! 制限時間を超えるとプロセスを強制終了します。作業ファイルは一時ディレクトリに置き、
//! 処理後に自動的に削除されます。

use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::api::OutputFormat;
use crate::error::RenderError;

/// エンジンの実行ファイルを指定する環境変数
pub const ENGINE_ENV_VAR: &str = "ODTFILL_SOFFICE";

/// デフォルトの制限時間（120秒）
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(120);

/// 既知のインストール先
const ENGINE_SEARCH_PATHS: [&str; 5] = [
    r"C:\Program Files\LibreOffice\program\soffice.exe",
    r"C:\Program Files (x86)\LibreOffice\program\soffice.exe",
    "/usr/bin/libreoffice",
    "/Applications/LibreOffice.app/Contents/MacOS/soffice",
    "/usr/bin/soffice",
];

/// `PATH`上で探す実行ファイル名
const ENGINE_NAMES: [&str; 2] = ["soffice", "libreoffice"];

/// 診断メッセージとして保持する標準出力・標準エラー出力の上限
const MAX_DIAGNOSTIC_BYTES: usize = 64 * 1024;

/// 終了待ちのポーリング間隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// プロセス終了後に出力の終端を待つ猶予期間
const CAPTURE_GRACE: Duration = Duration::from_secs(2);

const SOURCE_NOT_LOADED_MARKER: &str = "Error: source file could not be loaded";
const SHARED_LIBRARIES_MARKER: &str = "error while loading shared libraries";

/// 外部エンジンによるレンダラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Renderer {
    engine: PathBuf,
    timeout: Duration,
}

impl Renderer {
    /// 実行ファイルを指定してレンダラーを生成
    ///
    /// 存在確認は行いません。起動に失敗した場合は`render`が`RenderError::Io`を返します。
    pub fn new(engine: impl Into<PathBuf>) -> Self {
        Self {
            engine: engine.into(),
            timeout: DEFAULT_RENDER_TIMEOUT,
        }
    }

    /// エンジンを探索してレンダラーを生成
    ///
    /// # 探索順序
    ///
    /// 1. `explicit`で指定されたパス（存在しなければ即座にエラー）
    /// 2. 環境変数`ODTFILL_SOFFICE`
    /// 3. `PATH`上の`soffice`、`libreoffice`
    /// 4. 既知のインストール先（Windows、Linux、macOS）
    ///
    /// # 戻り値
    ///
    /// * `Ok(Renderer)` - エンジンが見つかった場合
    /// * `Err(RenderError::EngineNotFound)` - 見つからなかった場合（探索したパスを含む）
    pub fn locate(explicit: Option<&Path>) -> Result<Self, RenderError> {
        if let Some(path) = explicit {
            return if path.is_file() {
                Ok(Self::new(path))
            } else {
                Err(RenderError::EngineNotFound {
                    searched: vec![path.to_path_buf()],
                })
            };
        }

        let mut searched = Vec::new();
        for candidate in engine_candidates() {
            if candidate.is_file() {
                debug!(engine = %candidate.display(), "rendering engine located");
                return Ok(Self::new(candidate));
            }
            searched.push(candidate);
        }

        Err(RenderError::EngineNotFound { searched })
    }

    /// 制限時間を設定
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// エンジンの実行ファイル
    pub fn engine(&self) -> &Path {
        &self.engine
    }

    /// 制限時間
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// メモリ上のODTを変換する
    ///
    /// # 引数
    ///
    /// * `container` - 再構築済みのODT
    /// * `file_stem` - 作業ファイル名（拡張子なし）。エンジンの出力ファイル名にも使われます
    /// * `format` - 出力フォーマット（`Odt`の場合はエンジンを起動せずそのまま返します）
    ///
    /// # 戻り値
    ///
    /// * `Ok(Vec<u8>)` - 変換後のバイト列
    /// * `Err(RenderError)` - エンジンの起動失敗、タイムアウト、変換失敗
    pub fn render(
        &self,
        container: &[u8],
        file_stem: &str,
        format: OutputFormat,
    ) -> Result<Vec<u8>, RenderError> {
        if !format.requires_engine() {
            return Ok(container.to_vec());
        }

        let workdir = tempfile::Builder::new().prefix("odtfill-").tempdir()?;
        let input = workdir.path().join(format!("{}.odt", staging_stem(file_stem)));
        std::fs::write(&input, container)?;
        let out_dir = workdir.path().join("out");
        std::fs::create_dir(&out_dir)?;

        let output = self.render_file(&input, &out_dir, format)?;
        let bytes = std::fs::read(&output)?;
        // workdirはここでドロップされ、作業ファイルごと削除される
        Ok(bytes)
    }

    /// ファイルを変換する
    ///
    /// 出力ファイル名は入力ファイル名の拡張子を置き換えたものです
    /// （`proposta.odt` → `out_dir/proposta.pdf`）。
    pub fn render_file(
        &self,
        input: &Path,
        out_dir: &Path,
        format: OutputFormat,
    ) -> Result<PathBuf, RenderError> {
        info!(
            engine = %self.engine.display(),
            input = %input.display(),
            format = format.extension(),
            "rendering document"
        );

        let mut child = Command::new(&self.engine)
            .arg("--headless")
            .arg("--convert-to")
            .arg(format.extension())
            .arg("--outdir")
            .arg(out_dir)
            .arg(input)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        let stdout_capture = Capture::spawn(child.stdout.take());
        let stderr_capture = Capture::spawn(child.stderr.take());

        let child = Arc::new(Mutex::new(child));
        let timed_out = Arc::new(AtomicBool::new(false));
        let status = {
            let _guard = TimeoutGuard::new(self.timeout, child.clone(), timed_out.clone());
            wait_for_exit(&child)?
        };

        // エンジンが起動した子プロセスがパイプを保持し続けても、待ち時間は猶予期間で打ち切る
        let stdout = stdout_capture.collect(CAPTURE_GRACE);
        let stderr = stderr_capture.collect(CAPTURE_GRACE);

        if timed_out.load(Ordering::SeqCst) {
            warn!(seconds = self.timeout.as_secs(), "rendering engine timed out");
            return Err(RenderError::Timeout {
                seconds: self.timeout.as_secs(),
                stderr,
            });
        }

        let expected = expected_output(input, out_dir, format);
        classify_outcome(status.success(), status.code(), stdout, stderr, &expected).map_err(
            |err| {
                warn!(error = %err, "rendering failed");
                err
            },
        )?;

        debug!(output = %expected.display(), "rendering finished");
        Ok(expected)
    }
}

/// 探索候補の一覧（環境変数、`PATH`、既知のインストール先の順）
fn engine_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Ok(explicit) = std::env::var(ENGINE_ENV_VAR) {
        if !explicit.trim().is_empty() {
            candidates.push(PathBuf::from(explicit.trim()));
        }
    }

    if let Some(path) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path) {
            for name in ENGINE_NAMES {
                candidates.push(dir.join(name));
                if cfg!(windows) {
                    candidates.push(dir.join(format!("{}.exe", name)));
                }
            }
        }
    }

    candidates.extend(ENGINE_SEARCH_PATHS.iter().map(PathBuf::from));
    candidates
}

/// エンジンに渡す作業ファイル名
///
/// 空白やパス区切りを含む名前はコマンドライン上で扱いにくいため置き換える。
fn staging_stem(file_stem: &str) -> String {
    let stem: String = file_stem
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '-',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    if stem.is_empty() {
        "document".to_string()
    } else {
        stem
    }
}

fn expected_output(input: &Path, out_dir: &Path, format: OutputFormat) -> PathBuf {
    let mut name = input
        .file_stem()
        .map(|s| s.to_os_string())
        .unwrap_or_else(|| "document".into());
    name.push(".");
    name.push(format.extension());
    out_dir.join(name)
}

/// プロセスの終了状態と出力から結果を判定する
///
/// LibreOfficeは変換に失敗しても終了コード0を返すことがあるため、
/// 標準エラー出力の既知のメッセージを終了コードより先に判定する。
fn classify_outcome(
    success: bool,
    code: Option<i32>,
    stdout: String,
    stderr: String,
    expected: &Path,
) -> Result<(), RenderError> {
    if stderr.contains(SHARED_LIBRARIES_MARKER) {
        return Err(RenderError::MissingSharedLibraries { stderr });
    }
    if stderr.contains(SOURCE_NOT_LOADED_MARKER) {
        return Err(RenderError::SourceNotLoaded { stderr });
    }
    if !success {
        return Err(RenderError::Failed { code, stderr });
    }
    if !expected.is_file() {
        return Err(RenderError::NoOutput {
            dir: expected
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            stdout,
        });
    }
    Ok(())
}

/// 標準出力・標準エラー出力の読み取り
///
/// 読み取りスレッドは上限までをバッファに蓄積し、終端に達すると完了を通知します。
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: mpsc::Receiver<()>,
}

impl Capture {
    fn spawn<R: Read + Send + 'static>(stream: Option<R>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (done_tx, done) = mpsc::channel();
        let sink = buffer.clone();
        thread::spawn(move || {
            if let Some(stream) = stream {
                let _ = read_truncated_into(stream, &sink, MAX_DIAGNOSTIC_BYTES);
            }
            let _ = done_tx.send(());
        });
        Self { buffer, done }
    }

    /// 終端を最大`grace`だけ待ち、それまでに読めた内容を返す
    ///
    /// 期限を過ぎた場合、読み取りスレッドは切り離されたまま残ります。
    fn collect(self, grace: Duration) -> String {
        let _ = self.done.recv_timeout(grace);
        let bytes = self
            .buffer
            .lock()
            .map(|buffer| buffer.clone())
            .unwrap_or_default();
        String::from_utf8_lossy(&bytes).trim().to_string()
    }
}

/// 上限までを`sink`に蓄積し、残りは読み捨てる
///
/// 読み捨てないと、パイプが詰まって子プロセスが終了できなくなる。
fn read_truncated_into<R: Read>(
    mut reader: R,
    sink: &Mutex<Vec<u8>>,
    max_bytes: usize,
) -> io::Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let n = match reader.read(&mut chunk) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        let mut buffer = sink
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "capture buffer lock poisoned"))?;
        let room = max_bytes.saturating_sub(buffer.len());
        buffer.extend_from_slice(&chunk[..n.min(room)]);
    }
}

fn wait_for_exit(child: &Mutex<Child>) -> Result<ExitStatus, RenderError> {
    loop {
        {
            let mut child = child
                .lock()
                .map_err(|_| io::Error::new(io::ErrorKind::Other, "child process lock poisoned"))?;
            if let Some(status) = child.try_wait()? {
                return Ok(status);
            }
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// 制限時間を過ぎたら子プロセスを強制終了するガード
///
/// ドロップ時に監視スレッドへ完了を通知し、終了を待ちます。
struct TimeoutGuard {
    done_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TimeoutGuard {
    fn new(timeout: Duration, child: Arc<Mutex<Child>>, timed_out: Arc<AtomicBool>) -> Self {
        let (tx, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            if rx.recv_timeout(timeout).is_ok() {
                return;
            }
            timed_out.store(true, Ordering::SeqCst);
            if let Ok(mut child) = child.lock() {
                let _ = child.kill();
            }
        });
        Self {
            done_tx: Some(tx),
            handle: Some(handle),
        }
    }
}

impl Drop for TimeoutGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.done_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
