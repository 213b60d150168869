use super::*;

use frames::ReplyKind;

fn pending(command: &str) -> (PendingCommand, oneshot::Receiver<Result<Reply, ClientError>>) {
    let (reply, receiver) = oneshot::channel();
    let timer = tokio::spawn(std::future::pending::<()>());
    (PendingCommand { command: command.to_owned(), reply, timer }, receiver)
}

fn reply(kind: ReplyKind, message: &str) -> Reply {
    Reply { identifier: Some(1), message: message.to_owned(), kind: Some(kind), stacktrace: None }
}

#[test]
fn ids_start_at_one_and_increase() {
    let mut table = PendingTable::default();
    assert_eq!(table.next_id(), 1);
    assert_eq!(table.next_id(), 2);
    assert_eq!(table.next_id(), 3);
}

#[tokio::test]
async fn take_removes_entry() {
    let mut table = PendingTable::default();
    let (command, _receiver) = pending("status");
    table.entries.insert(7, command);

    assert_eq!(table.len(), 1);
    assert!(table.take(7).is_some());
    assert!(table.take(7).is_none());
    assert_eq!(table.len(), 0);
}

#[tokio::test]
async fn reject_all_settles_every_entry() {
    let mut table = PendingTable::default();
    let mut receivers = Vec::new();
    for (id, text) in [(1, "a"), (2, "b"), (3, "c")] {
        let (command, receiver) = pending(text);
        table.entries.insert(id, command);
        receivers.push(receiver);
    }

    table.reject_all(&ClientError::ConnectionClosed);
    assert_eq!(table.len(), 0);
    for receiver in receivers {
        assert_eq!(receiver.await, Ok(Err(ClientError::ConnectionClosed)));
    }
}

#[tokio::test]
async fn resolve_passes_normal_reply_through() {
    let (command, receiver) = pending("status");
    command.resolve(reply(ReplyKind::Generic, "hostname: x"));
    assert_eq!(receiver.await, Ok(Ok(reply(ReplyKind::Generic, "hostname: x"))));
}

#[tokio::test]
async fn resolve_turns_error_reply_into_remote_error() {
    let (command, receiver) = pending("bogus");
    command.resolve(reply(ReplyKind::Error, "Command not found"));
    assert_eq!(
        receiver.await,
        Ok(Err(ClientError::Remote { command: "bogus".into(), message: "Command not found".into() }))
    );
}

#[tokio::test]
async fn settle_tolerates_abandoned_caller() {
    let (command, receiver) = pending("status");
    drop(receiver);
    command.settle(Err(ClientError::ConnectionClosed));
}
