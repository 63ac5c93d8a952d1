//! Utility functions for file naming and disk space

use std::path::Path;

/// Longest sanitized name, in bytes
///
/// Leaves room under the usual 255-byte component limit for the
/// `.7z.NNN` suffix the splitter appends.
pub const MAX_FILE_NAME_BYTES: usize = 240;

/// Extensions longer than this are treated as part of the stem when truncating
const MAX_EXTENSION_BYTES: usize = 16;

/// Extract the `filename` parameter from a Content-Disposition header value
///
/// Follows RFC 6266 precedence: an RFC 5987 `filename*` parameter wins over a
/// plain `filename`. Quoted strings have their backslash escapes removed and
/// extended values are percent-decoded. Returns `None` if neither parameter is
/// present or the value is empty.
///
/// # Examples
///
/// ```
/// use bahador::utils::filename_from_content_disposition;
///
/// assert_eq!(
///     filename_from_content_disposition(r#"attachment; filename="my \"file\".zip""#),
///     Some("my \"file\".zip".to_string())
/// );
/// assert_eq!(
///     filename_from_content_disposition("attachment; filename*=UTF-8''na%C3%AFve%20file.txt"),
///     Some("naïve file.txt".to_string())
/// );
/// ```
pub fn filename_from_content_disposition(value: &str) -> Option<String> {
    let mut plain = None;
    let mut extended = None;

    for param in split_params(value) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();
        match key.as_str() {
            "filename*" => extended = decode_ext_value(raw),
            "filename" => plain = Some(unquote(raw)),
            _ => {}
        }
    }

    extended.or(plain).filter(|name| !name.is_empty())
}

/// Split header parameters on `;`, ignoring separators inside quoted strings
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(&value[start..]);
    params
}

/// Remove surrounding quotes and backslash escapes from a quoted-string
fn unquote(raw: &str) -> String {
    let Some(inner) = raw.strip_prefix('"') else {
        // bare token
        return raw.to_string();
    };
    let inner = inner.strip_suffix('"').unwrap_or(inner);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode an RFC 5987 ext-value: `charset'lang'percent-encoded`
fn decode_ext_value(raw: &str) -> Option<String> {
    let raw = raw.trim_matches('"');
    let encoded = match raw.splitn(3, '\'').collect::<Vec<_>>().as_slice() {
        [_charset, _lang, encoded] => *encoded,
        _ => raw,
    };
    urlencoding::decode(encoded).ok().map(|s| s.into_owned())
}

/// Last path segment of a URL, percent-decoded
///
/// Returns `None` when the path reduces to nothing (e.g. `https://host/` or
/// a trailing slash).
///
/// # Examples
///
/// ```
/// use bahador::utils::filename_from_url;
///
/// assert_eq!(
///     filename_from_url("https://example.com/files/report%202024.pdf?x=1"),
///     Some("report 2024.pdf".to_string())
/// );
/// assert_eq!(filename_from_url("https://example.com/"), None);
/// ```
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() || last == "/" {
        return None;
    }
    let decoded = urlencoding::decode(last).ok()?.into_owned();
    if decoded.is_empty() || decoded == "/" {
        return None;
    }
    Some(decoded)
}

/// Make a remote-supplied name safe to use as a single local path component
///
/// Path separators and control characters become `_`; names that would
/// resolve to the current or parent directory are rejected with an empty
/// string so the caller treats them as missing. Names longer than
/// [`MAX_FILE_NAME_BYTES`] are shortened, keeping the extension.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned == "." || cleaned == ".." {
        return String::new();
    }
    truncate_file_name(cleaned, MAX_FILE_NAME_BYTES)
}

fn truncate_file_name(name: String, max: usize) -> String {
    if name.len() <= max {
        return name;
    }

    let (stem, extension) = match name.rfind('.') {
        Some(dot) if dot > 0 && name.len() - dot <= MAX_EXTENSION_BYTES => name.split_at(dot),
        _ => (name.as_str(), ""),
    };
    let mut end = max - extension.len();
    while !stem.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}{}", &stem[..end], extension)
}

/// Get available disk space for a given path
///
/// Uses platform-specific APIs to query filesystem statistics:
/// - Linux/macOS: statvfs
/// - Windows: GetDiskFreeSpaceExW
pub fn get_available_space(path: &Path) -> std::io::Result<u64> {
    #[cfg(unix)]
    {
        use std::ffi::CString;
        use std::os::unix::ffi::OsStrExt;

        let c_path = CString::new(path.as_os_str().as_bytes())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        // SAFETY: c_path is a valid null-terminated string, stat is zeroed
        // before the call and only read after statvfs reports success.
        unsafe {
            let mut stat: libc::statvfs = std::mem::zeroed();
            if libc::statvfs(c_path.as_ptr(), &mut stat) != 0 {
                return Err(std::io::Error::last_os_error());
            }

            #[allow(clippy::unnecessary_cast)]
            let available_bytes = (stat.f_bavail as u64).saturating_mul(stat.f_frsize as u64);
            Ok(available_bytes)
        }
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::OsStrExt;
        use winapi::um::fileapi::GetDiskFreeSpaceExW;

        let wide_path: Vec<u16> = path
            .as_os_str()
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        // SAFETY: wide_path is null-terminated and every out pointer refers to
        // a live, aligned u64 that is only read after a successful call.
        unsafe {
            let mut free_bytes_available: u64 = 0;
            let mut _total_bytes: u64 = 0;
            let mut _total_free_bytes: u64 = 0;

            if GetDiskFreeSpaceExW(
                wide_path.as_ptr(),
                &mut free_bytes_available as *mut u64 as *mut _,
                &mut _total_bytes as *mut u64 as *mut _,
                &mut _total_free_bytes as *mut u64 as *mut _,
            ) == 0
            {
                return Err(std::io::Error::last_os_error());
            }

            Ok(free_bytes_available)
        }
    }

    #[cfg(not(any(unix, windows)))]
    {
        Err(std::io::Error::new(
            std::io::ErrorKind::Unsupported,
            "Disk space checking is not supported on this platform",
        ))
    }
}
