/// Recommended error type for your scenario `main` function and any shared code that you write for
/// scenarios and hooks. This type is compatible with the [crate::definition::HookResult] type so you
/// can use `?` to propagate errors.
pub type StampedeResult<T> = anyhow::Result<T>;
