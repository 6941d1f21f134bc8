//! Nettoyage des noms de fichiers reçus de l'extérieur
//!
//! Un nom de fichier du cache finit toujours joint au répertoire servi : il ne
//! doit donc contenir ni séparateur, ni nom réservé, ni composant `..`.

/// Segment qui préfixe les handles émis par le cache
pub const HANDLE_SEGMENT: &str = "files/";

const MAX_FILENAME_BYTES: usize = 255;

const WINDOWS_RESERVED: &[&str] = &[
    "con", "prn", "aux", "nul", "com0", "com1", "com2", "com3", "com4", "com5", "com6", "com7",
    "com8", "com9", "lpt0", "lpt1", "lpt2", "lpt3", "lpt4", "lpt5", "lpt6", "lpt7", "lpt8",
    "lpt9",
];

/// Nettoie un nom de fichier pour qu'il reste dans le répertoire servi
///
/// Retire les séparateurs et caractères illégaux, les caractères de contrôle,
/// les noms composés uniquement de points, les noms réservés Windows et les
/// points/espaces finaux, puis tronque à 255 octets. Le résultat peut être vide.
///
/// ```
/// use yomicache::sanitize_filename;
///
/// assert_eq!(sanitize_filename("../../etc/passwd"), "....etcpasswd");
/// assert_eq!(sanitize_filename(".."), "");
/// ```
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '?' | '<' | '>' | '\\' | ':' | '*' | '|' | '"'))
        .filter(|c| !c.is_control())
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        return String::new();
    }

    let stem = cleaned.split('.').next().unwrap_or_default().to_ascii_lowercase();
    if WINDOWS_RESERVED.contains(&stem.as_str()) {
        return String::new();
    }

    let trimmed = cleaned.trim_end_matches(['.', ' ']);
    truncate_bytes(trimmed, MAX_FILENAME_BYTES).to_string()
}

/// Retire tout ce qui précède (et inclut) le dernier segment `files/`
///
/// Permet de passer indifféremment un nom nu, un handle `/files/x` ou une
/// URL complète `https://host/files/x`.
pub fn strip_handle_prefix(name: &str) -> &str {
    match name.rfind(HANDLE_SEGMENT) {
        Some(pos) => &name[pos + HANDLE_SEGMENT.len()..],
        None => name,
    }
}

fn truncate_bytes(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
