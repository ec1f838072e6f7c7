use std::{env, fs, path::PathBuf};

use ts_rs::TS;

fn generate_types_content() -> String {
    const HEADER: &str = "// This file was generated by `crates/server/src/bin/generate_types.rs`.\n\n// Do not edit this file manually.";

    let decls: Vec<String> = vec![
        utils::locale::Locale::decl(),
        utils::response::ApiResponse::<()>::decl(),
        db::models::user::UserRole::decl(),
        db::models::user::QuranLevel::decl(),
        db::models::user::UserProfile::decl(),
        db::models::program::LocalizedProgram::decl(),
        db::models::news::LocalizedNews::decl(),
        db::models::event::LocalizedEvent::decl(),
        db::models::gallery::LocalizedGalleryItem::decl(),
        db::models::gallery::GalleryTranslationFields::decl(),
        db::models::contact::Contact::decl(),
        db::models::contact::CreateContact::decl(),
        db::models::chat::ChatVisibility::decl(),
        db::models::chat::Chat::decl(),
        db::models::message::MessageRole::decl(),
        db::models::message::MessagePart::decl(),
        db::models::message::Message::decl(),
        db::models::vote::Vote::decl(),
        db::models::document::DocumentKind::decl(),
        db::models::document::Document::decl(),
        db::models::document::Suggestion::decl(),
        services::services::content::Page::decl(),
        services::services::content::program::CreateProgram::decl(),
        services::services::content::program::UpdateProgram::decl(),
        services::services::content::program::ProgramDto::decl(),
        services::services::content::news::CreateNews::decl(),
        services::services::content::news::UpdateNews::decl(),
        services::services::content::news::NewsDto::decl(),
        services::services::content::event::CreateEvent::decl(),
        services::services::content::event::UpdateEvent::decl(),
        services::services::content::event::EventDto::decl(),
        services::services::content::gallery::CreateGalleryItem::decl(),
        services::services::content::gallery::UpdateGalleryItem::decl(),
        services::services::content::gallery::GalleryTranslationInput::decl(),
        services::services::content::gallery::GalleryItemDto::decl(),
        services::services::auth::AuthErrorCode::decl(),
        services::services::auth::RegisterRequest::decl(),
        services::services::auth::LoginRequest::decl(),
        services::services::auth::EmailCodeRequest::decl(),
        services::services::auth::VerifyEmailCodeRequest::decl(),
        services::services::auth::Session::decl(),
        services::services::users::ProfilePatch::decl(),
        services::services::users::AdminUserPatch::decl(),
        services::services::chat::ChatWithMessages::decl(),
        services::services::chat::SaveDocument::decl(),
        services::services::assistant::ChatRequest::decl(),
        services::services::assistant::events::ToolStatus::decl(),
        services::services::assistant::events::ChatEvent::decl(),
        server::routes::health::HealthStatus::decl(),
        server::routes::contacts::MarkContact::decl(),
        server::routes::chat::VoteKind::decl(),
        server::routes::chat::VoteRequest::decl(),
        server::routes::chat::VisibilityRequest::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|d| {
            let trimmed = d.trim_start();
            if trimmed.starts_with("export") {
                d
            } else {
                format!("export {trimmed}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{HEADER}\n\n{body}\n")
}

fn main() {
    let check_mode = env::args().any(|arg| arg == "--check");
    let shared_path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../shared")
        .join("types.ts");
    let generated = generate_types_content();

    if check_mode {
        let current = fs::read_to_string(&shared_path).unwrap_or_default();
        if current == generated {
            println!("✅ shared/types.ts is up to date.");
            std::process::exit(0);
        } else {
            eprintln!("❌ shared/types.ts is not up to date. Run 'cargo run --bin generate_types' and commit the changes.");
            std::process::exit(1);
        }
    }

    println!("Writing TypeScript types to {}", shared_path.display());
    if let Some(parent) = shared_path.parent() {
        fs::create_dir_all(parent).expect("cannot create shared/");
    }
    fs::write(&shared_path, generated).expect("unable to write types.ts");
    println!("✅ TypeScript types generated in shared/");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_declaration_is_exported() {
        let content = generate_types_content();
        assert!(content.contains("export type Locale"));
        assert!(content.contains("export type ChatEvent"));
        assert!(content.contains("export type ProgramDto"));
        assert!(
            !content
                .lines()
                .any(|l| l.starts_with("type ") || l.starts_with("interface "))
        );
    }
}
