//! Built-in preset catalog.

use super::Preset;

pub const HTR: &str = "HTR";
pub const HTR_DOCUMENT_AI: &str = "HTR_DocumentAI";
pub const OCR_DOCUMENT_AI: &str = "OCR_DocumentAI";
pub const CORRECT_TEXT: &str = "Correct_Text";
pub const TRANSLATION: &str = "Translation";
pub const METADATA: &str = "Metadata";

const HTR_SYSTEM_PROMPT: &str = r#"Your task is to accurately transcribe handwritten historical documents, minimizing the CER and WER. Work character by character, word by word, line by line, transcribing the text exactly as it appears on the page. To maintain the authenticity of the historical text, retain spelling errors, grammar, syntax, and punctuation as well as line breaks. Transcribe all the text on the page including headers, footers, marginalia, insertions, page numbers, etc. If these are present, insert them where indicated by the author (as applicable). In your response, write: "Transcription:" followed only by your accurate transcription"#;

const HTR_USER_PROMPT: &str = r#"Carefully transcribe this page from an 18th/19th century document. In your response, write: "Transcription:" followed only by your accurate transcription."#;

const CORRECT_SYSTEM_PROMPT: &str = r#"Your task is to compare handwritten pages of text with corresponding draft transcriptions, correcting the transcription to produce an accurate, publishable transcript. Be sure that the spelling, syntax, punctuation, and line breaks in the transcription match those on the handwritten page to preserve the historical integrity of the document. Numbers are also easily misread, so pay close attention to digits. You must also ensure that the transcription begins and ends in the same place as the handwritten document. Include any catchwords at the bottom of the page. In your response write "Corrected Transcript:" followed by your corrected transcription."#;

const CORRECT_USER_PROMPT: &str = "Your task is to use the handwritten page image to correct the following transcription, retaining the spelling, syntax, punctuation, line breaks, catchwords, etc of the original.\n\n{text_to_process}";

const TRANSLATION_SYSTEM_PROMPT: &str = r#"You translate historical documents from other languages into English. In your response, write "Translation:" followed by a faithful, accurate translation of the document."#;

const TRANSLATION_USER_PROMPT: &str = "Text to translate:\n\n{text_to_process}";

const METADATA_SYSTEM_PROMPT: &str = r#"You analyze historical documents to extract information. Read the document and then make any notes you require. Then, in your response, write "Metadata:" and then on new lines output the following headings, filling in the information beside each one:

Document Type: <Letter/Baptismal Record/Diary Entry/Will/etc.>
Author: <Last Name, First Name> - Note: for letters, memos, etc. use the name of the author of the document. For other documents whose primary purpose is official documentation of an individual, like a parish record, prison record or military service file, use the name of the person the record is about.
Correspondent: <Last Name, First Name> - Note: Only for letters; use the name of the person the document is addressed to
Correspondent Place: <Place where the correspondent is located> - Note: Only for letters
Date: <DD/MM/YYYY>
Place of Creation: <Place where the document was written; for diary entries, use the place where the diarist was located at the end of the day of the entry>
People: <Last Name, First Name; Last Name, First Name;...>
Places: <Place; Place;...>
Summary:

For People, list all the names of people mentioned in the document. For Places, list all the places mentioned in the document. For Summary, write a brief summary of the document.

If you don't have information for a heading or don't know, leave it blank."#;

const METADATA_USER_PROMPT: &str = "Text to analyze:\n\n{text_to_process}";

/// Headers a metadata response must carry.
pub const METADATA_HEADERS: &[&str] = &[
    "Document Type",
    "Author",
    "Date",
    "Place of Creation",
    "People",
    "Places",
    "Summary",
];

/// Headers a metadata response may carry for letters.
pub const METADATA_OPTIONAL_HEADERS: &[&str] = &["Correspondent", "Correspondent Place"];

/// The default preset list, in display order.
pub fn default_presets() -> Vec<Preset> {
    vec![
        Preset {
            name: HTR.to_string(),
            model: "gemini-2.5-pro".to_string(),
            general_instructions: HTR_SYSTEM_PROMPT.to_string(),
            specific_instructions: HTR_USER_PROMPT.to_string(),
            temperature: 0.3,
            val_text: "Transcription:".to_string(),
            use_images: true,
            required_headers: Vec::new(),
        },
        Preset {
            name: HTR_DOCUMENT_AI.to_string(),
            model: "document_ai_handwriting".to_string(),
            general_instructions: String::new(),
            specific_instructions: String::new(),
            temperature: 0.0,
            val_text: String::new(),
            use_images: true,
            required_headers: Vec::new(),
        },
        Preset {
            name: OCR_DOCUMENT_AI.to_string(),
            model: "document_ai_ocr".to_string(),
            general_instructions: String::new(),
            specific_instructions: String::new(),
            temperature: 0.0,
            val_text: String::new(),
            use_images: true,
            required_headers: Vec::new(),
        },
        Preset {
            name: CORRECT_TEXT.to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            general_instructions: CORRECT_SYSTEM_PROMPT.to_string(),
            specific_instructions: CORRECT_USER_PROMPT.to_string(),
            temperature: 0.2,
            val_text: "Corrected Transcript:".to_string(),
            use_images: true,
            required_headers: Vec::new(),
        },
        Preset {
            name: TRANSLATION.to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            general_instructions: TRANSLATION_SYSTEM_PROMPT.to_string(),
            specific_instructions: TRANSLATION_USER_PROMPT.to_string(),
            temperature: 0.2,
            val_text: "Translation:".to_string(),
            use_images: false,
            required_headers: Vec::new(),
        },
        Preset {
            name: METADATA.to_string(),
            model: "claude-3-5-sonnet-20241022".to_string(),
            general_instructions: METADATA_SYSTEM_PROMPT.to_string(),
            specific_instructions: METADATA_USER_PROMPT.to_string(),
            temperature: 0.3,
            val_text: "Metadata:".to_string(),
            use_images: false,
            required_headers: METADATA_HEADERS.iter().map(|h| h.to_string()).collect(),
        },
    ]
}
