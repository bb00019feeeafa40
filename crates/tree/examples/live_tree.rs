//! Live tree example - build a small document, query it, watch mutations

use dom::{Combinator, NodeInit, Selector};
use tokio::sync::mpsc;
use tree::{MutationOptions, Tree, TreeConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let tree = Tree::new(TreeConfig::default());
    println!("Tree: {}", tree.config().id);

    let document = tree.create(NodeInit::document());
    let html = tree.create(NodeInit::element("html"));
    let body = tree.create(NodeInit::element("body"));
    let list = tree.create(NodeInit::element("ul").with_id("menu"));

    tree.append_child(&document, &html, MutationOptions::default()).await?;
    tree.append_child(&html, &body, MutationOptions::default()).await?;
    tree.append_child(&body, &list, MutationOptions::default()).await?;

    // Watch the list while items are added concurrently
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut adds = Vec::new();
    for (index, label) in ["Home", "Docs", "About"].into_iter().enumerate() {
        let item = tree.create(NodeInit::element("li").with_attribute("data-label", label));
        if index == 0 {
            tree.merge(&item, vec![dom::Field::ClassList {
                classes: vec!["active".to_string()],
            }])
            .await?;
        }
        let (tree, list, tx) = (tree.clone(), list.clone(), tx.clone());
        adds.push(tokio::spawn(async move {
            tree.append_child(&list, &item, MutationOptions::notify(tx)).await
        }));
    }
    drop(tx);
    for add in adds {
        add.await??;
    }
    while let Some(record) = rx.recv().await {
        println!("{:?} on {}: added {:?}", record.kind, record.target, record.added);
    }

    let doc = tree.get(&document).await?;
    println!("Document members: {}", doc.members.len());
    println!("Document bindings: {:?}", doc.document);

    let items = tree
        .query_selector_all(&document, &Selector::tag("li"))
        .await?;
    println!("Items in document order: {:?}", items);

    let active = Selector::id("menu").then(Combinator::Child, Selector::class("active"));
    if let Some(found) = tree.query_selector(&body, &active).await? {
        println!("Active item: {:?}", tree.snapshot(&found).attr("data-label"));
    }

    tree.shutdown().await;
    Ok(())
}
