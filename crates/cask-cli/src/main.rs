#![deny(warnings)]
#![deny(clippy::all)]

use std::cell::RefCell;
use std::fs::File;
use std::io::{self, BufRead, BufReader, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};

use bip39::Mnemonic;
use clap::{Parser, Subcommand};
use rand_core::{OsRng, RngCore};
use secrecy::{ExposeSecret, Secret, SecretString};
use tracing::info;
use tracing_subscriber::EnvFilter;

use cask_format::armor::{ArmoredWriter, Format};
use cask_format::{
    read_identities, read_recipients, x25519, DecryptError, Decryptor, EncryptError, Encryptor,
    FileKey, Identity, ParseError, Recipient, Stanza,
};

const EXIT_SUCCESS: i32 = 0;
const EXIT_CLI: i32 = 2;
const EXIT_FORMAT: i32 = 3;
const EXIT_IO: i32 = 4;

const PASSPHRASE_ENV: &str = "CASK_PASSPHRASE";

#[derive(Parser, Debug)]
#[command(name = "cask", version, about = "Encrypt and decrypt age-format files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a new identity
    Keygen {
        /// Write the identity to this file instead of standard output
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        #[arg(long)]
        force: bool,
    },
    /// Encrypt the input to one or more recipients
    Encrypt {
        /// Input file; standard input if omitted or "-"
        input: Option<PathBuf>,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Encrypt to the given recipient; may be repeated
        #[arg(short, long = "recipient", value_name = "RECIPIENT")]
        recipients: Vec<String>,
        /// Encrypt to the recipients listed in a file; may be repeated
        #[arg(short = 'R', long = "recipients-file", value_name = "PATH")]
        recipients_files: Vec<PathBuf>,
        /// Encrypt with a passphrase instead of recipients
        #[arg(short, long)]
        passphrase: bool,
        /// Write armored (PEM-style) output
        #[arg(short, long)]
        armor: bool,
    },
    /// Decrypt the input
    Decrypt {
        /// Input file; standard input if omitted or "-"
        input: Option<PathBuf>,
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
        /// Use the identities in a file; may be repeated
        #[arg(short, long = "identity", value_name = "PATH")]
        identities: Vec<PathBuf>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("{0}")]
    Encrypt(#[from] EncryptError),
    #[error("{0}")]
    Decrypt(#[from] DecryptError),
    #[error("{0}")]
    Parse(#[from] ParseError),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("{0}")]
    Cli(String),
}

fn main() {
    std::process::exit(run());
}

fn run() -> i32 {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            if err.exit_code() == 0 {
                let _ = err.print();
                return EXIT_SUCCESS;
            }
            let message = err.to_string();
            let line = message.lines().next().unwrap_or("error: invalid arguments");
            eprintln!("{line}");
            return EXIT_CLI;
        }
    };

    let result = match cli.command {
        Commands::Keygen { output, force } => cmd_keygen(output.as_deref(), force),
        Commands::Encrypt {
            input,
            output,
            recipients,
            recipients_files,
            passphrase,
            armor,
        } => cmd_encrypt(
            input.as_deref(),
            output.as_deref(),
            &recipients,
            &recipients_files,
            passphrase,
            armor,
        ),
        Commands::Decrypt {
            input,
            output,
            identities,
        } => cmd_decrypt(input.as_deref(), output.as_deref(), &identities),
    };

    match result {
        Ok(()) => EXIT_SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            map_exit_code(&err)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn map_exit_code(err: &CliError) -> i32 {
    match err {
        CliError::Io(_) => EXIT_IO,
        CliError::Cli(_) => EXIT_CLI,
        CliError::Encrypt(EncryptError::Io(_)) => EXIT_IO,
        CliError::Decrypt(DecryptError::Io(_)) => EXIT_IO,
        _ => EXIT_FORMAT,
    }
}

fn cmd_keygen(output: Option<&Path>, force: bool) -> Result<(), CliError> {
    let identity = x25519::Identity::generate();
    let public = identity.to_public();
    let created = chrono::Local::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);

    let contents = format!(
        "# created: {created}\n# public key: {public}\n{}\n",
        identity.to_string().expose_secret()
    );

    match output {
        Some(path) => {
            let mut options = File::options();
            options.write(true).create(true);
            if force {
                options.truncate(true);
            } else {
                options.create_new(true);
            }
            #[cfg(unix)]
            {
                use std::os::unix::fs::OpenOptionsExt;
                options.mode(0o600);
            }
            let mut file = options.open(path)?;
            file.write_all(contents.as_bytes())?;
            file.flush()?;
            eprintln!("Public key: {public}");
        }
        None => {
            print!("{contents}");
            eprintln!("Public key: {public}");
        }
    }
    Ok(())
}

fn cmd_encrypt(
    input: Option<&Path>,
    output: Option<&Path>,
    recipient_args: &[String],
    recipients_files: &[PathBuf],
    passphrase: bool,
    armor: bool,
) -> Result<(), CliError> {
    let mut stdin_guard = StdinGuard::new();

    // Binary ciphertext on a terminal is never useful; require "-o -" to
    // force it.
    if output.is_none() && !armor && io::stdout().is_terminal() {
        return Err(CliError::Cli(
            "refusing to output binary to the terminal (did you mean -a/--armor? \
             force with \"-o -\")"
                .to_owned(),
        ));
    }

    let encryptor = if passphrase {
        if !recipient_args.is_empty() || !recipients_files.is_empty() {
            return Err(CliError::Cli(
                "-p/--passphrase cannot be combined with recipients".to_owned(),
            ));
        }
        Encryptor::with_user_passphrase(passphrase_for_encryption()?)
    } else {
        let mut recipients: Vec<Box<dyn Recipient>> = Vec::new();
        for arg in recipient_args {
            let recipient: x25519::Recipient = arg
                .parse()
                .map_err(|reason: &str| CliError::Cli(format!("invalid recipient: {reason}")))?;
            recipients.push(Box::new(recipient));
        }
        for path in recipients_files {
            recipients.extend(read_recipients(stdin_guard.open_buffered(path)?)?);
        }
        if recipients.is_empty() {
            return Err(CliError::Cli(
                "missing recipients: use -r, -R, or -p".to_owned(),
            ));
        }
        Encryptor::with_recipients(recipients)?
    };

    let mut source = stdin_guard.open_input(input)?;
    let sink = open_output(output)?;
    let format = if armor {
        Format::AsciiArmor
    } else {
        Format::Binary
    };

    info!(armored = armor, "encrypting");

    let armored = ArmoredWriter::wrap_output(sink, format)?;
    let mut writer = encryptor.wrap_output(armored)?;
    io::copy(&mut source, &mut writer)?;
    let armored = writer.finish().map_err(EncryptError::Crypto)?;
    let mut sink = armored.finish()?;
    sink.flush()?;
    Ok(())
}

fn cmd_decrypt(
    input: Option<&Path>,
    output: Option<&Path>,
    identity_files: &[PathBuf],
) -> Result<(), CliError> {
    let mut stdin_guard = StdinGuard::new();

    let mut identities: Vec<Box<dyn Identity>> = Vec::new();
    if identity_files.is_empty() {
        // Prompting happens only if an scrypt stanza is actually present.
        identities.push(Box::new(LazyPassphrase::new()));
    } else {
        // Explicit identities and passphrase files do not mix; fail loudly
        // instead of falling through to an interactive prompt.
        identities.push(Box::new(RejectPassphrase));
        for path in identity_files {
            identities.extend(read_identities(stdin_guard.open_buffered(path)?)?);
        }
    }

    let source = stdin_guard.open_input(input)?;
    let decryptor = Decryptor::new(source)?;

    info!(stanzas = decryptor.stanzas().len(), "decrypting");

    let mut reader = decryptor.decrypt(identities.iter().map(|identity| identity.as_ref()))?;
    let mut sink = open_output(output)?;
    io::copy(&mut reader, &mut sink).map_err(DecryptError::from)?;
    sink.flush()?;
    Ok(())
}

/// Ensures at most one of input, recipients, and identities reads stdin.
struct StdinGuard {
    used: bool,
}

impl StdinGuard {
    fn new() -> Self {
        Self { used: false }
    }

    fn claim(&mut self) -> Result<(), CliError> {
        if self.used {
            return Err(CliError::Cli(
                "standard input can back at most one of input, recipients, and identities"
                    .to_owned(),
            ));
        }
        self.used = true;
        Ok(())
    }

    fn open_input(&mut self, path: Option<&Path>) -> Result<Box<dyn Read>, CliError> {
        match path {
            Some(path) if path.as_os_str() != "-" => Ok(Box::new(File::open(path)?)),
            _ => {
                self.claim()?;
                Ok(Box::new(io::stdin()))
            }
        }
    }

    fn open_buffered(&mut self, path: &Path) -> Result<Box<dyn BufRead>, CliError> {
        if path.as_os_str() == "-" {
            self.claim()?;
            let mut contents = String::new();
            io::stdin().read_to_string(&mut contents)?;
            Ok(Box::new(io::Cursor::new(contents)))
        } else {
            Ok(Box::new(BufReader::new(File::open(path)?)))
        }
    }
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>, CliError> {
    match path {
        Some(path) if path.as_os_str() != "-" => Ok(Box::new(File::create(path)?)),
        _ => Ok(Box::new(io::stdout())),
    }
}

fn passphrase_from_env() -> Option<SecretString> {
    std::env::var(PASSPHRASE_ENV).ok().map(Secret::new)
}

fn passphrase_for_encryption() -> Result<SecretString, CliError> {
    if let Some(passphrase) = passphrase_from_env() {
        return Ok(passphrase);
    }
    let first =
        rpassword::prompt_password("Enter passphrase (leave empty to autogenerate a secure one): ")?;
    if first.is_empty() {
        let generated = autogenerate_passphrase()?;
        eprintln!("using autogenerated passphrase \"{generated}\"");
        return Ok(Secret::new(generated));
    }
    let second = rpassword::prompt_password("Confirm passphrase: ")?;
    if first != second {
        return Err(CliError::Cli("passphrases did not match".to_owned()));
    }
    Ok(Secret::new(first))
}

fn passphrase_for_decryption() -> Result<SecretString, CliError> {
    if let Some(passphrase) = passphrase_from_env() {
        return Ok(passphrase);
    }
    Ok(Secret::new(rpassword::prompt_password("Enter passphrase: ")?))
}

/// Twelve hyphen-joined wordlist words, 128 bits of entropy.
fn autogenerate_passphrase() -> Result<String, CliError> {
    let mut entropy = [0u8; 16];
    OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy(&entropy)
        .map_err(|_| CliError::Cli("could not generate a passphrase".to_owned()))?;
    Ok(mnemonic
        .to_string()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-"))
}

/// An identity that prompts for the passphrase the first time an scrypt
/// stanza is seen, then caches it.
struct LazyPassphrase {
    cached: RefCell<Option<cask_format::scrypt::Identity>>,
}

impl LazyPassphrase {
    fn new() -> Self {
        Self {
            cached: RefCell::new(None),
        }
    }
}

impl Identity for LazyPassphrase {
    fn unwrap_stanzas(&self, stanzas: &[Stanza]) -> Option<Result<FileKey, DecryptError>> {
        if !stanzas.iter().any(|stanza| stanza.tag == "scrypt") {
            return None;
        }

        let mut cached = self.cached.borrow_mut();
        if cached.is_none() {
            match passphrase_for_decryption() {
                Ok(passphrase) => {
                    *cached = Some(cask_format::scrypt::Identity::new(passphrase));
                }
                // No usable passphrase; let the aggregate "no matching
                // keys" failure report it.
                Err(_) => return None,
            }
        }
        cached
            .as_ref()
            .and_then(|identity| identity.unwrap_stanzas(stanzas))
    }
}

/// Refuses passphrase-encrypted files when explicit identities were given,
/// instead of falling through to an interactive prompt.
struct RejectPassphrase;

impl Identity for RejectPassphrase {
    fn unwrap_stanzas(&self, stanzas: &[Stanza]) -> Option<Result<FileKey, DecryptError>> {
        match stanzas {
            [stanza] if stanza.tag == "scrypt" => Some(Err(DecryptError::Identity(
                "file is passphrase-encrypted but identities were specified with \
                 -i/--identity; remove them to decrypt with the passphrase"
                    .to_owned(),
            ))),
            _ => None,
        }
    }
}
