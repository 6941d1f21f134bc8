//! Dérivation des clés de cache et types MIME

use sha2::{Digest, Sha256};

/// Calcule un nom de fichier stable pour une URL source
///
/// Deux appels avec la même URL donnent le même nom, ce qui permet au cache
/// de reconnaître un contenu déjà servi.
///
/// ```
/// use yomicache::filename_from_url;
///
/// let a = filename_from_url("http://komga:25600/api/v1/series/42/thumbnail", "jpg");
/// let b = filename_from_url("http://komga:25600/api/v1/series/42/thumbnail", "jpg");
/// assert_eq!(a, b);
/// assert!(a.ends_with(".jpg"));
/// ```
pub fn filename_from_url(url: &str, extension: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    let result = hasher.finalize();
    let pk = hex::encode(&result[..16]); // 16 octets = 32 caractères hex
    if extension.is_empty() {
        pk
    } else {
        format!("{}.{}", pk, extension)
    }
}

/// Extension de fichier pour un Content-Type d'image
pub fn extension_for(content_type: &str) -> &'static str {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/avif" => "avif",
        _ => "bin",
    }
}

/// Content-Type déduit de l'extension d'un fichier servi
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "avif" => "image/avif",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_urls_give_distinct_names() {
        let a = filename_from_url("http://h/books/1/pages/1", "png");
        let b = filename_from_url("http://h/books/1/pages/2", "png");
        assert_ne!(a, b);
        assert_eq!(a.len(), 32 + 4);
    }

    #[test]
    fn test_extension_for_ignores_parameters() {
        assert_eq!(extension_for("image/jpeg; charset=binary"), "jpg");
        assert_eq!(extension_for("IMAGE/PNG"), "png");
        assert_eq!(extension_for("application/zip"), "bin");
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("abc.webp"), "image/webp");
        assert_eq!(content_type_for("abc.JPEG"), "image/jpeg");
        assert_eq!(content_type_for("abc"), "application/octet-stream");
    }
}
