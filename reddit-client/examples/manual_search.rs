use reddit_client::{ForumClient, RedditClient, SearchQuery};
use redlabel_core::{CredentialsConfig, ReplaceMore, SearchSort};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let subreddit = args.next().unwrap_or_else(|| "worldnews".to_string());
    let query = args.next().unwrap_or_else(|| "war".to_string());

    println!("=== Reddit search check ===\n");
    println!("Reads REDDIT_CLIENT_ID, REDDIT_CLIENT_SECRET and REDDIT_USER_AGENT (or .env)\n");

    let credentials = CredentialsConfig::default().resolve()?;
    let client = RedditClient::new(credentials)?;

    let token = client.authenticate().await?;
    println!("Authenticated, scopes: {:?}\n", token.scope);
    client.set_token(token).await;

    let posts = client
        .search(&subreddit, &SearchQuery::new(query.as_str(), SearchSort::Top, 5))
        .await?;
    println!("r/{} returned {} posts for {:?}", subreddit, posts.len(), query);

    for post in &posts {
        let tree = client.expand_comments(post, ReplaceMore::Drop).await?;
        println!(
            "  [{}] {} ({} comments loaded, {} reported)",
            post.score,
            post.title,
            tree.len(),
            post.num_comments
        );
    }

    let status = client.get_rate_limit_status().await;
    println!(
        "\nRate limit: {}/{} tokens available",
        status.available_tokens, status.max_tokens
    );

    Ok(())
}
