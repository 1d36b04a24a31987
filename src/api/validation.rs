use crate::api::errors::ApiError;
use std::path::Path;

pub(crate) fn validate_image_upload(
    filename: &str,
    content_type: &str,
    allowed_extensions: &[String],
) -> Result<(), ApiError> {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ApiError::BadRequest("File must have an extension".to_string()))?;

    if !allowed_extensions.iter().any(|allowed| allowed == &extension) {
        return Err(ApiError::BadRequest(format!("File extension '{extension}' is not allowed")));
    }

    let mime = content_type.trim().to_ascii_lowercase();
    if mime_allowed_for_extension(&mime, &extension) {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "MIME type '{mime}' does not match extension '.{extension}'"
        )))
    }
}

fn mime_allowed_for_extension(mime: &str, extension: &str) -> bool {
    match extension {
        "jpg" | "jpeg" => matches!(mime, "image/jpeg" | "image/jpg"),
        "png" => mime == "image/png",
        "webp" => mime == "image/webp",
        "gif" => mime == "image/gif",
        "bmp" => matches!(mime, "image/bmp" | "image/x-ms-bmp"),
        "tiff" => matches!(mime, "image/tiff" | "image/tif"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::validate_image_upload;

    fn allowed() -> Vec<String> {
        vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
    }

    #[test]
    fn accepts_matching_extension_and_mime() {
        assert!(validate_image_upload("sheet.png", "image/png", &allowed()).is_ok());
        assert!(validate_image_upload("sheet.JPG", "image/jpeg", &allowed()).is_ok());
    }

    #[test]
    fn rejects_disallowed_extension() {
        assert!(validate_image_upload("sheet.pdf", "application/pdf", &allowed()).is_err());
        assert!(validate_image_upload("sheet", "image/png", &allowed()).is_err());
    }

    #[test]
    fn rejects_mismatched_mime() {
        assert!(validate_image_upload("sheet.png", "image/jpeg", &allowed()).is_err());
    }
}
