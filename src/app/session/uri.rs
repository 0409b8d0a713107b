use super::api::PlayerError;

const FILE_SCHEME: &str = "file://";

fn has_drive_letter(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes.len() == 2 || bytes[2] == b'/' || bytes[2] == b'\\')
}

/// `C:\Shows\a.mkv` becomes `file:///C:/Shows/a.mkv`, `/srv/a.mkv` becomes `file:///srv/a.mkv`.
pub(crate) fn file_uri_from_path(path: &str) -> String {
    if has_drive_letter(path) {
        return format!("{FILE_SCHEME}/{}", path.replace('\\', "/"));
    }
    if cfg!(windows) {
        format!("{FILE_SCHEME}{}", path.replace('\\', "/"))
    } else {
        format!("{FILE_SCHEME}{path}")
    }
}

/// Inverse of [`file_uri_from_path`]; also undoes percent-escaping added by the player.
pub(crate) fn path_from_file_uri(uri: &str) -> Result<String, PlayerError> {
    let rest = uri
        .strip_prefix(FILE_SCHEME)
        .ok_or_else(|| PlayerError::InvalidUri(uri.to_string()))?;
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    let decoded = urlencoding::decode(rest)
        .map_err(|_| PlayerError::InvalidUri(uri.to_string()))?
        .into_owned();

    if let Some(windows_path) = decoded.strip_prefix('/')
        && has_drive_letter(windows_path)
    {
        return Ok(windows_path.replace('/', "\\"));
    }
    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_paths_keep_their_slashes() {
        assert_eq!(
            file_uri_from_path("/srv/tv/Show.S01E01.mkv"),
            "file:///srv/tv/Show.S01E01.mkv"
        );
        assert_eq!(
            path_from_file_uri("file:///srv/tv/My%20Show/Show.S01E01.mkv").expect("decode"),
            "/srv/tv/My Show/Show.S01E01.mkv"
        );
    }

    #[test]
    fn drive_letter_paths_get_a_leading_slash_and_native_separators_back() {
        let uri = file_uri_from_path(r"D:\Downloads\The Bear\The.Bear.S01E05.mkv");
        assert_eq!(uri, "file:///D:/Downloads/The Bear/The.Bear.S01E05.mkv");

        let path = path_from_file_uri("file:///D:/Downloads/The%20Bear/The.Bear.S01E05.mkv")
            .expect("decode");
        assert_eq!(path, r"D:\Downloads\The Bear\The.Bear.S01E05.mkv");
    }

    #[cfg(unix)]
    #[test]
    fn backslashes_in_unix_file_names_survive() {
        let uri = file_uri_from_path(r"/srv/tv/odd\name.S01E01.mkv");
        assert_eq!(uri, r"file:///srv/tv/odd\name.S01E01.mkv");
        assert_eq!(
            path_from_file_uri("file:///srv/tv/odd%5Cname.S01E01.mkv").expect("decode"),
            r"/srv/tv/odd\name.S01E01.mkv"
        );
    }

    #[test]
    fn localhost_authority_is_ignored() {
        assert_eq!(
            path_from_file_uri("file://localhost/srv/a%5Bb%5D.mkv").expect("decode"),
            "/srv/a[b].mkv"
        );
    }

    #[test]
    fn non_file_uris_are_rejected() {
        let err = path_from_file_uri("http://example.test/a.mkv").expect_err("not a file uri");
        assert!(matches!(err, PlayerError::InvalidUri(_)));
    }
}
