//! Container Module
//!
//! ODTコンテナ（ZIPアーカイブ）からのペイロード抽出と、
//! ペイロードのみを差し替えたコンテナの再構築を提供するモジュール。
//!
//! どちらの処理もメモリ上のバイト列に対して完結するため、
//! ステージング用の一時ファイルは作成しません。

mod extractor;
mod rebuilder;

pub use extractor::extract;
pub use rebuilder::rebuild;

pub(crate) use extractor::extract_with;
pub(crate) use rebuilder::rebuild_with;

/// 編集対象のペイロードエントリのパス（ODTの規約で固定）
pub const CONTENT_XML_PATH: &str = "content.xml";
