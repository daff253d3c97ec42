mod chat_flow;
mod controller;
mod streaming;
