use anyhow::Result;
use clap::{Parser, Subcommand};
use sos_core::{NotifyChannel, channel::TEST_MESSAGE, phone::DEFAULT_COUNTRY_CODE};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, env = "SOS_COUNTRY_CODE", default_value = DEFAULT_COUNTRY_CODE)]
    country_code: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the E.164 form of each number
    Normalize { phones: Vec<String> },

    /// Send the test SMS to one number
    SendTest {
        phone: String,

        #[arg(long, env = "TWILIO_SID")]
        account_sid: Option<String>,

        #[arg(long, env = "TWILIO_AUTH", hide_env_values = true)]
        auth_token: Option<String>,

        #[arg(long, env = "TWILIO_NUMBER")]
        from_number: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let normalizer = sos_cli::normalizer(&args.country_code)?;

    match args.command {
        Command::Normalize { phones } => {
            let results = sos_cli::normalize_all(&normalizer, &phones);
            println!("{}", sos_cli::report(&results));
        }
        Command::SendTest {
            phone,
            account_sid,
            auth_token,
            from_number,
        } => {
            let address = normalizer.normalize(&phone)?;
            let channel = sos_cli::twilio_channel(account_sid, auth_token, from_number)?;

            let receipt = channel.send(&address, TEST_MESSAGE).await?;
            println!("Sent to {address} ({})", receipt.message_id);
        }
    }

    Ok(())
}
