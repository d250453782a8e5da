//! Chat copy. Everything here is Telegram HTML; dynamic text goes through
//! [`escape`].

use crate::platform::{Button, Keyboard};
use zkyc_core::{AiExtraction, CombinedVerification, FaceComparison};

pub const EXTRACT_TEXT: &str = "extract_text";
pub const FACE_RECOGNITION: &str = "face_recognition";
pub const FULL_KYC: &str = "full_kyc";
pub const HELP: &str = "help";
pub const BACK_TO_MENU: &str = "back_to_menu";

/// Prompt for the standalone document flow.
pub const DOCUMENT_PROMPT: &str = "Extract all visible text from this document and organize it clearly.
If this is an ID document, identify:
- Name
- ID number
- Date of birth
- Document type
- Any other important information

Format the response in a clear, structured way.";

/// Visible characters of model output kept in one reply. Telegram rejects
/// messages longer than 4096 characters; the rest of the template fits in
/// what remains.
pub const MAX_EXTRACT_CHARS: usize = 3500;

/// Escaped `text`, cut to [`MAX_EXTRACT_CHARS`] visible characters.
fn escape_clipped(text: &str) -> String {
    match text.char_indices().nth(MAX_EXTRACT_CHARS) {
        Some((end, _)) => format!("{}…", escape(&text[..end])),
        None => escape(text),
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c => out.push(c),
        }
    }
    out
}

pub fn menu_keyboard() -> Keyboard {
    vec![
        vec![Button::new("🔍 Extract Text from ID", EXTRACT_TEXT)],
        vec![Button::new("👤 Face Recognition", FACE_RECOGNITION)],
        vec![Button::new("🏛️ Full KYC Verification", FULL_KYC)],
        vec![Button::new("ℹ️ Help", HELP)],
    ]
}

pub fn back_keyboard() -> Keyboard {
    vec![vec![Button::new("🔙 Back to Menu", BACK_TO_MENU)]]
}

pub fn welcome(first_name: &str) -> String {
    format!(
        "🤖 <b>Welcome to ZKYC Bot, {}!</b>\n\n\
         I'm your AI-powered KYC verification assistant. I can help you with:\n\n\
         🔍 <b>Text Extraction</b> - Extract text from ID documents using AI\n\
         👤 <b>Face Recognition</b> - Compare faces between two photos\n\
         🏛️ <b>KYC Verification</b> - Complete identity verification process\n\n\
         Choose an option below to get started! 👇",
        escape(first_name)
    )
}

pub const MENU: &str = "🤖 <b>ZKYC Bot - AI-Powered Identity Verification</b>\n\n\
                        Choose what you'd like to do:";

pub const HELP_MENU: &str = "ℹ️ <b>ZKYC Bot Help</b>\n\n\
<b>Available Features:</b>\n\n\
🔍 <b>Text Extraction</b>\n\
- Upload any document image\n\
- AI extracts and analyzes text\n\n\
👤 <b>Face Recognition</b>\n\
- Compare two face photos\n\
- Returns similarity score\n\n\
🏛️ <b>KYC Verification</b>\n\
- ID text extraction + face matching\n\
- Verification report\n\n\
<b>Commands:</b>\n\
/start - Show main menu\n\
/help - Show this help message\n\
/cancel - Cancel current operation\n\n\
<b>Tips:</b>\n\
• Use clear, well-lit photos\n\
• Ensure text is readable";

pub const HELP_COMMAND: &str = "🤖 <b>ZKYC Bot Help</b>\n\n\
This bot provides AI-powered document analysis and face recognition for KYC verification.\n\n\
<b>Available Commands:</b>\n\
• <code>/start</code> - Start the bot and show main menu\n\
• <code>/help</code> - Show this help message\n\
• <code>/cancel</code> - Cancel current operation\n\n\
<b>How to Use:</b>\n\
1. Send <code>/start</code> to begin\n\
2. Choose an option from the menu\n\
3. Follow the prompts to upload images\n\
4. Receive the analysis results\n\n\
<b>Supported Formats:</b> JPG, PNG, GIF, BMP";

pub const EXTRACT_MODE: &str = "📸 <b>Text Extraction Mode</b>\n\n\
Please send me a photo of your ID document or any document with text.\n\
I'll use AI to extract and analyze the text for you!\n\n\
📤 Just upload the image now...";

pub const FACE_MODE: &str = "👤 <b>Face Recognition Mode</b>\n\n\
I'll help you compare faces between two photos.\n\n\
📸 <b>Step 1:</b> Send me the first photo (e.g., ID card photo)";

pub const KYC_MODE: &str = "🏛️ <b>Full KYC Verification</b>\n\n\
I'll perform complete identity verification by:\n\
• Extracting information from your ID card\n\
• Comparing your face with the ID photo\n\n\
📸 <b>Step 1:</b> Send me your ID card photo";

pub const FIRST_FACE_RECEIVED: &str = "✅ <b>First photo received!</b>\n\n\
📸 <b>Step 2:</b> Now send me the second photo to compare";

pub const ID_CARD_RECEIVED: &str = "✅ <b>ID card received!</b>\n\n\
📸 <b>Step 2:</b> Now send me a selfie photo for face verification";

pub const ANALYZING_DOCUMENT: &str =
    "🤖 <b>Analyzing document with AI...</b>\nThis may take a few seconds...";
pub const COMPARING_FACES: &str = "👤 <b>Comparing faces with AI...</b>\nThis may take a moment...";
pub const VERIFYING_KYC: &str =
    "🏛️ <b>Performing KYC verification...</b>\nThis may take up to 30 seconds...";

pub const PHOTO_WITHOUT_FLOW: &str = "❓ I'm not sure what to do with this image.\n\
Please use /start to choose an action first!";

pub const SEND_A_PHOTO: &str = "📸 Please send a <b>photo</b> to continue, \
or use /cancel to stop the current operation.";

pub const CANCELLED: &str =
    "❌ <b>Operation cancelled.</b>\n\nUse /start to begin a new operation.";

pub fn document_result(extraction: &AiExtraction) -> String {
    format!(
        "✅ <b>Document Analysis Complete!</b>\n\n\
         🔍 <b>Extracted Information:</b>\n<pre>{}</pre>\n\n\
         🤖 <b>Model:</b> {}\n\n\
         Use /start to perform another operation.",
        escape_clipped(&extraction.text),
        escape(&extraction.model)
    )
}

pub fn face_result(face: &FaceComparison) -> String {
    let (emoji, status) = if face.verified {
        ("✅", "MATCH")
    } else {
        ("❌", "NO MATCH")
    };
    format!(
        "{emoji} <b>Face Recognition Result</b>\n\n\
         <b>Status:</b> {status}\n\
         <b>Confidence:</b> {:.2}%\n\
         <b>Distance:</b> {:.4}\n\
         <b>Threshold:</b> {:.4}\n\n\
         <b>Technical Details:</b>\n\
         • Model: {}\n\
         • Detector: {}\n\n\
         Use /start to perform another operation.",
        face.confidence() * 100.0,
        face.distance,
        face.threshold,
        escape(&face.model),
        escape(&face.detector_backend)
    )
}

/// `timestamp` is the human-readable time of the check.
pub fn kyc_report(v: &CombinedVerification, timestamp: &str, extracted: &str) -> String {
    let verified = v.face.verified;
    let (emoji, status) = if verified {
        ("✅", "VERIFIED")
    } else {
        ("❌", "FAILED")
    };
    format!(
        "🏛️ <b>KYC VERIFICATION REPORT</b>\n\n\
         <b>Verification ID:</b> {}\n\
         <b>Timestamp:</b> {timestamp}\n\
         <b>Status:</b> {emoji} {status}\n\n\
         📋 <b>Extracted ID Information:</b>\n<pre>{}</pre>\n\n\
         👤 <b>Face Verification:</b>\n\
         • <b>Match:</b> {}\n\
         • <b>Confidence:</b> {:.2}%\n\
         • <b>Technical Score:</b> {:.4}\n\n\
         Use /start to perform another verification.",
        v.verification_id,
        escape_clipped(extracted),
        if verified { "YES" } else { "NO" },
        v.face.confidence() * 100.0,
        v.face.distance,
    )
}

pub fn document_failed(detail: &str) -> String {
    format!(
        "❌ <b>Error processing image:</b>\n{}\n\n\
         Please try again with a different image or use /start to restart.",
        escape(detail)
    )
}

pub fn face_failed(detail: &str) -> String {
    format!(
        "❌ <b>Face recognition failed:</b>\n{}\n\n\
         Make sure both images contain clear, visible faces. Use /start to try again.",
        escape(detail)
    )
}

pub fn kyc_failed(detail: &str) -> String {
    format!(
        "❌ <b>KYC verification failed:</b>\n{}\n\n\
         Please ensure you've uploaded clear, readable images. Use /start to try again.",
        escape(detail)
    )
}
