//! Classification prompt shared by every remote provider.

use super::AnalyzeRequest;

/// Build the full classification prompt for one item. The reply contract
/// is strict JSON so the normalizer has something to hold onto.
pub fn build_prompt(request: &AnalyzeRequest) -> String {
    let mut prompt = String::new();

    if let Some(context) = request.custom_context {
        prompt.push_str("Context: ");
        prompt.push_str(context);
        prompt.push_str("\n\n");
    }

    prompt.push_str(
        "You are organizing a media library into folders. Classify the item \
         described below into the best matching folder.\n\n",
    );

    prompt.push_str("Item metadata:\n");
    prompt.push_str(&format!("- filename: {}\n", request.item.filename));
    if let Some(alt) = request.item.alt_text.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("- alt text: {alt}\n"));
    }
    if let Some(caption) = request.item.caption.as_deref().filter(|s| !s.is_empty()) {
        prompt.push_str(&format!("- caption: {caption}\n"));
    }
    if let Some(desc) = request
        .item
        .description
        .as_deref()
        .filter(|s| !s.is_empty())
    {
        prompt.push_str(&format!("- description: {desc}\n"));
    }
    if let Some(taken) = request.item.exif.taken_at.as_deref() {
        prompt.push_str(&format!("- taken at: {taken}\n"));
    }
    if let Some(make) = request.item.exif.camera_make.as_deref() {
        prompt.push_str(&format!("- camera: {make}\n"));
    }

    if request.folder_context.is_empty() {
        prompt.push_str("\nThere are no existing folders yet.\n");
    } else {
        prompt.push_str("\nExisting folders:\n");
        for path in request.folder_context {
            prompt.push_str(&format!("- {path}\n"));
        }
    }

    if !request.suggested_folders.is_empty() {
        prompt.push_str("\nPreferred folder names, use when they fit:\n");
        for name in request.suggested_folders {
            prompt.push_str(&format!("- {name}\n"));
        }
    }

    prompt.push_str(&format!(
        "\nRules:\n\
         - Prefer an existing folder when one fits.\n\
         - Folder paths use / as separator and nest at most {} levels.\n",
        request.max_depth
    ));
    if request.allow_new_folders {
        prompt.push_str("- You may propose a new folder path when nothing fits.\n");
    } else {
        prompt.push_str("- Do not propose new folders; assign to an existing one or skip.\n");
    }

    prompt.push_str(
        "\nReply with ONLY a JSON object, no prose, in this exact shape:\n\
         {\n\
           \"action\": \"assign\" | \"create\" | \"skip\",\n\
           \"folder_path\": \"<existing folder path, for assign>\",\n\
           \"new_folder_path\": \"<new folder path, for create>\",\n\
           \"confidence\": <number between 0 and 1>,\n\
           \"reason\": \"<one short sentence>\"\n\
         }\n",
    );

    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::MediaItem;

    #[test]
    fn test_prompt_lists_folders_and_rules() {
        let item = MediaItem {
            id: 1,
            filename: "beach.jpg".to_string(),
            alt_text: Some("sunset over water".to_string()),
            caption: None,
            description: None,
            mime_type: "image/jpeg".to_string(),
            exif: Default::default(),
            payload_path: None,
        };
        let folders = vec!["Pets".to_string(), "Travel".to_string()];
        let request = AnalyzeRequest {
            item: &item,
            folder_context: &folders,
            max_depth: 2,
            allow_new_folders: false,
            image: None,
            suggested_folders: &[],
            custom_context: Some("family archive"),
        };

        let prompt = build_prompt(&request);
        assert!(prompt.contains("beach.jpg"));
        assert!(prompt.contains("sunset over water"));
        assert!(prompt.contains("- Travel"));
        assert!(prompt.contains("Do not propose new folders"));
        assert!(prompt.starts_with("Context: family archive"));
    }
}
