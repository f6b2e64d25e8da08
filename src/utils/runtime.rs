use anyhow::Result;

/// The daemon is strictly event driven, one action runs to completion before the next. A single
/// worker thread keeps that guarantee cheap.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
