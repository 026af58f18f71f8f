pub mod backend;
pub mod call;
pub mod chat;
pub mod cli;
pub mod history;
pub mod languages;
pub mod models;

use backend::{ AuthClient, FunctionsClient, SpeechClient, StreamingChat, TranslateClient };
use call::{ CallSession, FileAudioOutput, StdinSpeechSource };
use chat::ChatTranslator;
use chat::pirate::{ PirateChatSession, PIRATE_GREETING };
use cli::{ Args, Mode };
use history::{ initialize_conversation_store, ConversationStore };
use languages::LanguageRegistry;
use log::info;
use std::error::Error;
use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{ AsyncBufReadExt, BufReader };

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Client Configuration ---");
    info!("Mode: {}", args.mode);
    info!("Backend URL: {}", args.backend_url);
    info!("Language Pair: {} -> {}", args.source_lang, args.target_lang);
    info!("History Store Type: {}", args.history_type);
    info!("----------------------------");

    let mode: Mode = args.mode.parse()?;

    let registry = match &args.languages_path {
        Some(path) => LanguageRegistry::from_file(path)?,
        None => LanguageRegistry::builtin(),
    };
    registry.ensure_supported(&args.source_lang)?;
    registry.ensure_supported(&args.target_lang)?;

    let connect_timeout = Duration::from_secs(args.connect_timeout_secs);
    let access_token = resolve_access_token(&args, connect_timeout).await?;
    let client = Arc::new(
        FunctionsClient::new(
            &args.backend_url,
            &args.anon_key,
            access_token.as_deref(),
            connect_timeout
        )?
    );
    let store = initialize_conversation_store(&args, access_token.as_deref())?;

    match mode {
        Mode::Chat => run_chat(&args, &registry, client, store).await,
        Mode::Pirate => run_pirate(client, store).await,
        Mode::Call => run_call(&args, client, store).await,
        Mode::Transcribe => run_transcribe(&args, client).await,
        Mode::History => run_history(&args, store).await,
    }
}

async fn resolve_access_token(
    args: &Args,
    connect_timeout: Duration
) -> Result<Option<String>, Box<dyn Error + Send + Sync>> {
    if let Some(token) = &args.access_token {
        return Ok(Some(token.clone()));
    }
    if let (Some(email), Some(password)) = (&args.email, &args.password) {
        let auth = AuthClient::new(&args.backend_url, &args.anon_key, connect_timeout)?;
        let session = auth.sign_in_with_password(email, password).await?;
        info!("Signed in as {}", email);
        return Ok(Some(session.access_token));
    }
    Ok(None)
}

async fn run_chat(
    args: &Args,
    registry: &LanguageRegistry,
    client: Arc<FunctionsClient>,
    store: Arc<dyn ConversationStore>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let translator: Arc<dyn TranslateClient> = client;
    let mut chat = ChatTranslator::new(
        translator,
        args.source_lang.as_str(),
        args.target_lang.as_str()
    ).with_store(store);

    println!(
        "Translating {} -> {}. Type a message, '/swap' to swap languages, Ctrl-D to exit.",
        registry.display_name(chat.source_lang()),
        registry.display_name(chat.target_lang())
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "/swap" {
            chat.swap_languages();
            println!(
                "Now translating {} -> {}",
                registry.display_name(chat.source_lang()),
                registry.display_name(chat.target_lang())
            );
            continue;
        }
        match chat.send(line).await {
            Ok(Some(message)) => {
                println!("[{}] {}", message.source_lang, message.original);
                println!("[{}] {}", message.target_lang, message.translated);
            }
            Ok(None) => {}
            Err(e) => eprintln!("Translation failed: {}", e),
        }
    }
    Ok(())
}

async fn run_pirate(
    client: Arc<FunctionsClient>,
    store: Arc<dyn ConversationStore>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let chat: Arc<dyn StreamingChat> = client;
    let mut session = PirateChatSession::new(chat).with_store(store);

    println!("{}", PIRATE_GREETING);
    print!("> ");
    let _ = std::io::stdout().flush();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if !line.is_empty() {
            let outcome = session.send(line, |token| {
                print!("{}", token);
                let _ = std::io::stdout().flush();
            }).await;
            println!();
            if let Err(e) = outcome {
                eprintln!("Chat failed: {}", e);
            }
        }
        print!("> ");
        let _ = std::io::stdout().flush();
    }
    Ok(())
}

async fn run_call(
    args: &Args,
    client: Arc<FunctionsClient>,
    store: Arc<dyn ConversationStore>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let translator: Arc<dyn TranslateClient> = client.clone();
    let speech: Arc<dyn SpeechClient> = client;
    let output = Arc::new(FileAudioOutput::new(&args.audio_out_dir));

    let (session, handle) = CallSession::new(
        translator,
        speech,
        output,
        args.source_lang.as_str(),
        args.target_lang.as_str()
    );
    let mut session = session.with_store(store);
    let mut source = StdinSpeechSource::new();

    println!(
        "Call started ({} -> {}). Each line is one utterance; Ctrl-C or Ctrl-D ends the call.",
        args.source_lang,
        args.target_lang
    );

    tokio::select! {
        result = session.run(&mut source) => result?,
        _ = tokio::signal::ctrl_c() => {
            handle.stop();
            info!("Call stopped");
        }
    }

    for item in session.transcript() {
        println!("[{}] {}", args.source_lang, item.original);
        println!("[{}] {}", args.target_lang, item.translated);
    }
    Ok(())
}

async fn run_transcribe(
    args: &Args,
    client: Arc<FunctionsClient>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let path = args.audio_file.as_deref().ok_or("transcribe mode requires --audio-file")?;
    let audio = tokio::fs
        ::read(path).await
        .map_err(|e| format!("Failed to read audio file '{}': {}", path, e))?;

    let text = client.transcribe(&audio).await?;
    println!("[{}] {}", args.source_lang, text);

    let translated = client.translate(&text, &args.source_lang, &args.target_lang).await?;
    println!("[{}] {}", args.target_lang, translated);

    let spoken = client.synthesize(&translated).await?;
    let out_dir = std::path::Path::new(&args.audio_out_dir);
    tokio::fs::create_dir_all(out_dir).await?;
    let out_path = out_dir.join("translation.mp3");
    tokio::fs::write(&out_path, &spoken).await?;
    info!("Saved spoken translation to {}", out_path.display());
    Ok(())
}

async fn run_history(
    args: &Args,
    store: Arc<dyn ConversationStore>
) -> Result<(), Box<dyn Error + Send + Sync>> {
    if let Some(id) = &args.delete_conversation {
        store.delete_conversation(id).await?;
        println!("Deleted conversation {}", id);
        return Ok(());
    }

    let conversations = store.list_conversations(None).await?;
    if conversations.is_empty() {
        println!("No conversations yet.");
        return Ok(());
    }

    for conversation in &conversations {
        let when = chrono::DateTime
            ::from_timestamp(conversation.created_at, 0)
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| conversation.created_at.to_string());
        println!("{} [{}] {} ({})", conversation.id, conversation.kind, conversation.title, when);

        let messages = store.get_messages(&conversation.id, args.history_limit).await?;
        for message in messages {
            match &message.translated_content {
                Some(translated) => {
                    let source = message.source_lang.as_deref().unwrap_or("?");
                    let target = message.target_lang.as_deref().unwrap_or("?");
                    println!("  [{}] {}", source, message.content);
                    println!("  [{}] {}", target, translated);
                }
                None => println!("  {}: {}", message.role, message.content),
            }
        }
    }
    Ok(())
}
