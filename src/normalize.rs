use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlError {
    #[error("invalid relay url '{0}': {1}")]
    Parse(String, url::ParseError),

    #[error("unsupported scheme in relay url '{0}'")]
    UnsupportedScheme(String),
}

/// normalize a URL and replace http://, https:// schemes with ws://, wss://
pub fn normalize_url(url_str: &str) -> Result<Url, UrlError> {
    let trimmed = url_str.trim();
    let url_string = match trimmed.split_once("://") {
        Some((scheme, _)) if scheme.eq_ignore_ascii_case("wss") || scheme.eq_ignore_ascii_case("ws") => {
            trimmed.to_string()
        }
        Some((scheme, _))
            if scheme.eq_ignore_ascii_case("https") || scheme.eq_ignore_ascii_case("http") =>
        {
            format!("ws{}", &trimmed[4..])
        }
        Some(_) => return Err(UrlError::UnsupportedScheme(url_str.to_string())),
        None => {
            if trimmed.starts_with("localhost")
                || trimmed.contains(".localhost")
                || trimmed.starts_with("127.0.0.1")
            {
                format!("ws://{}", trimmed)
            } else {
                format!("wss://{}", trimmed)
            }
        }
    };
    let mut url = Url::parse(&url_string).map_err(|err| UrlError::Parse(url_str.to_string(), err))?;

    // normalize host to lowercase
    match url.host_str() {
        Some(host) if !host.is_empty() => {
            let host = host.to_lowercase();
            let _ = url.set_host(Some(&host));
        }
        _ => {
            return Err(UrlError::Parse(
                url_str.to_string(),
                url::ParseError::EmptyHost,
            ))
        }
    }

    // remove trailing slash from path
    let path = url.path().trim_end_matches('/').to_owned();
    url.set_path(&path);

    Ok(url)
}

/// normalize a list of relay urls, dropping duplicates and keeping first-seen order;
/// urls that fail to parse are returned separately
pub fn normalize_urls<S: AsRef<str>>(urls: &[S]) -> (Vec<Url>, Vec<(String, UrlError)>) {
    let mut valid: Vec<Url> = Vec::with_capacity(urls.len());
    let mut invalid = Vec::new();
    for url in urls {
        match normalize_url(url.as_ref()) {
            Ok(url) if !valid.contains(&url) => valid.push(url),
            Ok(_) => {}
            Err(err) => invalid.push((url.as_ref().to_string(), err)),
        }
    }
    (valid, invalid)
}
