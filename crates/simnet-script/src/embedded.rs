//! Embedded default program.

/// The program nodes run before any `CodeChange` arrives: print the
/// context, forward `"data"` to every out-neighbor, collect one message
/// per in-neighbor, repeat until cancelled.
pub const DEFAULT_PROGRAM: &str = r#"
-- Forward "data" to every out-neighbor, then wait for one message from
-- each in-neighbor. Exits gracefully when cancelled.
function run(ctx, send, await_n)
    print("id", ctx.id)
    print("out-neighbors", #ctx.out_neighbors)
    print("in-neighbors", #ctx.in_neighbors)

    local sent = 0
    repeat
        for _, peer in ipairs(ctx.out_neighbors) do
            sent = sent + send(peer, "data")
        end
        if #ctx.in_neighbors > 0 then
            local got = await_n(#ctx.in_neighbors)
            print("received", #got)
        end
    until ctx.cancelled() or (#ctx.out_neighbors == 0 and #ctx.in_neighbors == 0)

    return sent
end
"#;
