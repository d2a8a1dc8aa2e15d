use clap::Parser;
use task_agent::proto::task_client::TaskClient;
use task_agent::proto::{task_response::Content, Method, TaskRequest};

#[derive(Parser, Debug)]
#[command(name = "submit-task")]
#[command(about = "CLI client that runs a shell command on a task-agent")]
struct Args {
    /// Server address
    #[arg(long, default_value = "http://127.0.0.1:50051")]
    addr: String,

    /// The command to execute
    #[arg(short, long)]
    cmd: String,

    /// Timeout in seconds (0 uses the server default)
    #[arg(short, long, default_value = "0")]
    timeout: i32,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut client = TaskClient::connect(args.addr.clone()).await?;

    let mut stream = client
        .run(TaskRequest {
            method: Method::Shell as i32,
            method_params: args.cmd.clone(),
            timeout: args.timeout,
            run_task_id: String::new(),
        })
        .await?
        .into_inner();

    loop {
        match stream.message().await {
            Ok(Some(frame)) => match frame.content {
                Some(Content::Output(line)) => println!("{}", line),
                Some(Content::Error(line)) => eprintln!("{}", line),
                None => {}
            },
            Ok(None) => break,
            Err(status) => {
                eprintln!("task failed: {}", status.message());
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
