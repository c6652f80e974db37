use anyhow::Result;
use model_observer::i18n::{gettext, set_translator};
use model_observer::observer::ConfigError;

#[tokio::test]
async fn config_errors_pass_through_installed_translator() -> Result<()> {
    assert!(set_translator(|message| format!("[fr] {}", message)));
    assert!(!set_translator(|message| message.to_string()));

    assert_eq!(gettext("hello"), "[fr] hello");

    let error = ConfigError::unknown_handler("ArticleObserver", "publish");
    assert_eq!(error.to_string(), "[fr] 'ArticleObserver' model has no method 'publish'");
    Ok(())
}
