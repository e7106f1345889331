use anyhow::Result;
use clap::{Parser, Subcommand};
use cryptool::algorithm::{self, keyparse};
use cryptool::auth::PasswordSource;
use cryptool::config::{self, Command, Options};
use cryptool::encoding;
use cryptool::envelope;
use cryptool::error::{Stage, StageExt};
use cryptool::hash;
use cryptool::keys::{KdfParams, SALT_LEN};
use cryptool::resolve;
use cryptool::storage::{self, Pending, Sink};
use cryptool::stream::{self, DEFAULT_BUFFER, Input};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

const COMMANDS: &[&str] = &[
    "decode", "decrypt", "encode", "encrypt", "hash", "help", "pubkey",
];

#[derive(Debug, clap::Args)]
struct ScryptArgs {
    /// scrypt cost as log2(N) (default: 16)
    #[arg(long = "scrypt-log-n")]
    log_n: Option<u8>,

    /// scrypt block size r (default: 16)
    #[arg(long = "scrypt-r")]
    r: Option<u32>,

    /// scrypt parallelism p (default: 1)
    #[arg(long = "scrypt-p")]
    p: Option<u32>,
}

impl ScryptArgs {
    fn to_kdf_params(&self) -> cryptool::Result<KdfParams> {
        let default = KdfParams::default();

        KdfParams::new(
            self.log_n.unwrap_or(default.log_n()),
            self.r.unwrap_or(default.r()),
            self.p.unwrap_or(default.p()),
        )
    }
}

#[derive(Debug, clap::Args)]
struct CipherArgs {
    /// Algorithm name, loosely matched (e.g. a256gcm, rsa-oaep-256)
    #[arg(short, long, default_value = algorithm::DEFAULT)]
    algorithm: String,

    /// Key file to read, or to write with --generate
    #[arg(short, long, value_name = "FILE")]
    key: Option<PathBuf>,

    /// Generate a new key and write it to --key
    #[arg(short, long)]
    generate: bool,

    /// Derive the key from a password; prompts unless given as --password=PASS
    #[arg(
        short,
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "",
        env = "CRYPTOOL_PASSWORD",
        hide_env_values = true
    )]
    password: Option<String>,

    /// Salt length in bytes for password-derived keys
    #[arg(long = "salt", value_name = "LEN", default_value_t = SALT_LEN)]
    salt_len: usize,

    #[command(flatten)]
    scrypt: ScryptArgs,

    /// File holding the IV/nonce; it is then not embedded in the output
    #[arg(long, value_name = "FILE")]
    iv: Option<PathBuf>,

    /// File holding a detached authentication tag
    #[arg(long, value_name = "FILE")]
    tag: Option<PathBuf>,

    /// Write the authentication tag to this file instead of the output
    #[arg(long, value_name = "FILE")]
    tag_out: Option<PathBuf>,

    /// File holding additional authenticated data
    #[arg(long, value_name = "FILE")]
    aad: Option<PathBuf>,

    /// Input file (default: stdin)
    #[arg(short, long = "in", value_name = "FILE")]
    input: Option<PathBuf>,

    /// Output file (default: stdout)
    #[arg(short, long = "out", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Text encoding for the ciphertext side and the key
    #[arg(short = 'n', long, value_name = "ENC")]
    encoding: Option<String>,

    #[arg(long, value_name = "ENC")]
    encode_in: Option<String>,

    #[arg(long, value_name = "ENC")]
    encode_out: Option<String>,

    #[arg(long, value_name = "ENC")]
    encode_key: Option<String>,

    #[arg(long, value_name = "ENC")]
    encode_iv: Option<String>,

    #[arg(long, value_name = "ENC")]
    encode_tag: Option<String>,

    #[arg(long, value_name = "ENC")]
    encode_aad: Option<String>,

    /// List supported algorithms
    #[arg(short, long)]
    list: bool,
}

impl CipherArgs {
    fn into_options(self, buffer: usize) -> Result<Options> {
        let password = self.password.map(|p| {
            if p.is_empty() {
                PasswordSource::Prompt
            } else {
                PasswordSource::Given(Zeroizing::new(p))
            }
        });

        Ok(Options {
            algorithm: Some(self.algorithm),
            key: self.key,
            generate: self.generate,
            password,
            salt_len: self.salt_len,
            kdf: self.scrypt.to_kdf_params()?,
            iv: self.iv,
            tag: self.tag,
            tag_out: self.tag_out,
            aad: self.aad,
            input: self.input,
            output: self.output,
            encoding: self.encoding,
            encode_in: self.encode_in,
            encode_out: self.encode_out,
            encode_key: self.encode_key,
            encode_iv: self.encode_iv,
            encode_tag: self.encode_tag,
            encode_aad: self.encode_aad,
            buffer,
        })
    }
}

#[derive(Debug, clap::Args)]
struct CodecArgs {
    /// Encoding scheme
    #[arg(short = 'n', long, value_name = "ENC", default_value = encoding::DEFAULT)]
    encoding: String,

    #[arg(short, long = "in", value_name = "FILE")]
    input: Option<PathBuf>,

    #[arg(short, long = "out", value_name = "FILE")]
    output: Option<PathBuf>,

    /// List supported encodings
    #[arg(short, long)]
    list: bool,
}

#[derive(Debug, Parser)]
#[command(name = "cryptool")]
#[command(
    version,
    about = "Encrypt, decrypt, encode and hash files with loosely named algorithms."
)]
struct Cli {
    /// Log pipeline stages to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Read buffer size in bytes
    #[arg(
        short,
        long,
        global = true,
        value_name = "SIZE",
        env = "CRYPTOOL_BUFFER",
        default_value_t = DEFAULT_BUFFER,
        value_parser = parse_buffer
    )]
    buffer: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Encrypts a file or stdin
    Encrypt(CipherArgs),

    /// Decrypts a file or stdin
    Decrypt(CipherArgs),

    /// Encodes bytes as text
    Encode(CodecArgs),

    /// Decodes text back to bytes
    Decode(CodecArgs),

    /// Prints the hex digest of a file or stdin
    Hash {
        /// Hash algorithm
        #[arg(short, long, default_value = hash::DEFAULT)]
        algorithm: String,

        #[arg(short, long = "in", value_name = "FILE")]
        input: Option<PathBuf>,

        #[arg(short, long = "out", value_name = "FILE")]
        output: Option<PathBuf>,

        /// List supported hash algorithms
        #[arg(short, long)]
        list: bool,
    },

    /// Prints the public key matching a private key as PEM
    Pubkey {
        /// Private key file (default: stdin)
        #[arg(short, long, value_name = "FILE")]
        key: Option<PathBuf>,

        #[arg(short, long = "out", value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn parse_buffer(raw: &str) -> std::result::Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(0) => Err("buffer size must be greater than 0".into()),
        Ok(n) => Ok(n),
        Err(e) => Err(e.to_string()),
    }
}

/// Replaces a loosely typed command word with its canonical name.
fn resolve_command(mut args: Vec<String>) -> Result<Vec<String>> {
    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        if arg == "-b" || arg == "--buffer" {
            i += 2;
            continue;
        }
        if arg.starts_with('-') {
            i += 1;
            continue;
        }
        let name = resolve::resolve("command", arg, COMMANDS, false)?;
        args[i] = name.to_string();
        break;
    }
    Ok(args)
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn list_algorithms() {
    println!("Supported algorithms:");
    for (i, (name, family)) in algorithm::list(None).into_iter().enumerate() {
        println!(" {:2} {:<4} {}", i + 1, family.to_string(), name);
    }
}

fn run_cipher(command: Command, args: CipherArgs, buffer: usize) -> Result<()> {
    if args.list {
        list_algorithms();
        return Ok(());
    }

    let job = config::validate(args.into_options(buffer)?, command)?;
    let algorithm = job.algorithm.name();
    let encodings = job.encodings.to_string();

    let pending = envelope::run(job)?;
    storage::commit(pending)?;

    tracing::info!(%command, algorithm, encodings = %encodings, "finished");
    Ok(())
}

fn run_codec(decode: bool, args: CodecArgs, buffer: usize) -> Result<()> {
    if args.list {
        println!("Supported encodings:");
        for (i, name) in encoding::names().into_iter().enumerate() {
            println!(" {:2} - {}", i + 1, name);
        }
        return Ok(());
    }

    let scheme = encoding::resolve(&args.encoding)?;
    let stage = if decode { Stage::Decode } else { Stage::Encode };
    let mut input = Input::open(args.input.as_deref()).stage(Stage::Input)?;
    let data = if decode {
        stream::read_all(&mut input, buffer, Some(scheme)).stage(stage)?
    } else {
        stream::encode_all(&mut input, buffer, scheme)
            .stage(stage)?
            .into_bytes()
    };

    storage::commit(vec![Pending::new(Sink::from_path(args.output), data, Stage::Output)])?;
    tracing::info!(encoding = scheme.name(), decode, "finished");
    Ok(())
}

fn main() -> Result<()> {
    let args = resolve_command(std::env::args().collect())?;
    let cli = Cli::parse_from(args);
    init_logging(cli.verbose);
    let buffer = cli.buffer;

    match cli.command {
        Commands::Encrypt(args) => run_cipher(Command::Encrypt, args, buffer)?,
        Commands::Decrypt(args) => run_cipher(Command::Decrypt, args, buffer)?,
        Commands::Encode(args) => run_codec(false, args, buffer)?,
        Commands::Decode(args) => run_codec(true, args, buffer)?,
        Commands::Hash {
            algorithm,
            input,
            output,
            list,
        } => {
            if list {
                println!("Supported hash algorithms:");
                for (i, name) in hash::names().iter().enumerate() {
                    println!(" {:2} {}", i + 1, name);
                }
                return Ok(());
            }
            let kind = hash::resolve(&algorithm)?;
            let mut input = Input::open(input.as_deref()).stage(Stage::Input)?;
            let digest = hash::digest(kind, &mut input, buffer).stage(Stage::Hash)?;
            let line = format!("{}\n", hex::encode(digest)).into_bytes();
            storage::commit(vec![Pending::new(Sink::from_path(output), line, Stage::Output)])?;
            tracing::info!(algorithm = kind.name(), "finished");
        }
        Commands::Pubkey { key, output } => {
            let mut input = Input::open(key.as_deref()).stage(Stage::Key)?;
            let material =
                Zeroizing::new(stream::read_all(&mut input, buffer, None).stage(Stage::Key)?);
            let parsed = keyparse::parse(&material).stage(Stage::PublicKey)?;
            let pem = parsed.public_pem().stage(Stage::PublicKey)?;
            storage::commit(vec![Pending::new(
                Sink::from_path(output),
                pem.into_bytes(),
                Stage::Output,
            )])?;
            tracing::info!(key = parsed.describe(), "finished");
        }
    }

    Ok(())
}
