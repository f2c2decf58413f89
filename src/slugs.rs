// src/slugs.rs

use crate::errors::AppError;

const MAX_SLUG_SUFFIX: u32 = 33;

/// Lowercase ASCII slug for URLs. Accents are transliterated, so
/// "Doña Inés" becomes `dona-ines`.
pub fn derive_slug(input: &str) -> Result<String, AppError> {
    let slug = slug::slugify(input);
    if slug.is_empty() {
        return Err(AppError::Validation(
            "No se pudo generar un slug válido a partir del nombre".to_string(),
        ));
    }
    Ok(slug)
}

/// `base`, then `base-2`, `base-3`, ... in the order they should be tried.
pub fn slug_candidates(base: &str) -> impl Iterator<Item = String> + '_ {
    std::iter::once(base.to_string())
        .chain((2..=MAX_SLUG_SUFFIX).map(move |n| format!("{}-{}", base, n)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spanish_names_are_transliterated() {
        assert_eq!(derive_slug("Doña Inés Peñaloza").unwrap(), "dona-ines-penaloza");
        assert_eq!(
            derive_slug("Café Especial, Geisha 250g").unwrap(),
            "cafe-especial-geisha-250g"
        );
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(matches!(derive_slug("   "), Err(AppError::Validation(_))));
        assert!(matches!(derive_slug("!!!"), Err(AppError::Validation(_))));
    }

    #[test]
    fn candidates_start_with_the_base() {
        let candidates: Vec<String> = slug_candidates("finca-la-esperanza").take(3).collect();
        assert_eq!(
            candidates,
            vec!["finca-la-esperanza", "finca-la-esperanza-2", "finca-la-esperanza-3"]
        );
        assert_eq!(slug_candidates("x").count(), 33);
    }
}
